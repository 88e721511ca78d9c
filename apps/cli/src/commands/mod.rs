//! 命令定义和实现

pub mod run;
pub mod trace;

pub use run::RunCommand;
pub use trace::TraceCommand;
