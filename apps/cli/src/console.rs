//! 控制台输入
//!
//! 专用输入线程逐行读取 stdin，解析后通过有界通道交给主线程：
//!
//! - `q`：结束比赛（发送 RaceEnd）
//! - keyboard 模式下其他行：按住的按键集合（如 `wi` 表示左右轮同时前进，空行表示松开）

use crossbeam_channel::{Receiver, bounded};
use racelink_control::Key;
use std::io::BufRead;
use std::thread;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    RaceEnd,
    HoldKeys(Vec<Key>),
}

/// 解析一行输入；无意义的行返回 `None`
pub fn parse_line(line: &str, keyboard: bool) -> Option<ConsoleCommand> {
    let trimmed = line.trim();
    if trimmed.eq_ignore_ascii_case("q") {
        return Some(ConsoleCommand::RaceEnd);
    }
    if !keyboard {
        return None;
    }

    // 行内空格表示 space 键，因此只去掉换行
    let raw = line.trim_end_matches(['\r', '\n']);
    let mut keys: Vec<Key> = Vec::new();
    for c in raw.chars() {
        match Key::from_char(c) {
            Some(key) if !keys.contains(&key) => keys.push(key),
            Some(_) => {},
            None => debug!("Console: ignoring key {:?}", c),
        }
    }
    Some(ConsoleCommand::HoldKeys(keys))
}

/// 启动输入线程
///
/// 线程阻塞在 stdin 上，不做 join；stdin 关闭时通道断开。
pub fn spawn_console(keyboard: bool) -> std::io::Result<Receiver<ConsoleCommand>> {
    let (tx, rx) = bounded(8);

    thread::Builder::new()
        .name("racelink-console".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("Console: failed to read stdin: {}", e);
                        break;
                    },
                };
                if let Some(command) = parse_line(&line, keyboard)
                    && tx.send(command).is_err()
                {
                    break;
                }
            }
            debug!("Console: input closed");
        })?;

    Ok(rx)
}
