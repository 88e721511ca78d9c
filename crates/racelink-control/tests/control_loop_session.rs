//! 控制循环 + 会话（进程内 Channel 传输）

use racelink_control::{
    ControlLoop, Key, KeyState, LoopConfig, ManualController, TableController,
};
use racelink_driver::{PipelineConfig, Session, TorqueSink, channel_transport};
use racelink_protocol::{BridgeMessage, TorqueCommand};
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn fast_pipeline() -> PipelineConfig {
    PipelineConfig {
        control_period_ms: 5,
        receive_timeout_ms: 2,
        outbox_capacity: 4,
    }
}

/// 收集对端收到的 control 消息，直到满足条件或超时
fn collect_until(
    peer: &racelink_driver::PeerEndpoint,
    timeout: Duration,
    mut done: impl FnMut(&[TorqueCommand]) -> bool,
) -> Vec<TorqueCommand> {
    let deadline = Instant::now() + timeout;
    let mut seen = Vec::new();
    while Instant::now() < deadline && !done(&seen) {
        if let Ok(BridgeMessage::Control {
            left_torque,
            right_torque,
        }) = peer.recv_timeout(Duration::from_millis(20))
        {
            seen.push(TorqueCommand::new(left_torque, right_torque));
        }
    }
    seen
}

#[test]
fn test_table_replay_reaches_peer() {
    let mut csv = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv, "Left_Torque,Right_Torque").unwrap();
    writeln!(csv, "0.25,0.75").unwrap();
    writeln!(csv, "-0.5,0.5").unwrap();
    csv.flush().unwrap();

    let table = TableController::from_path(csv.path()).unwrap();
    assert_eq!(table.len(), 2);

    let (transport, peer) = channel_transport(8);
    let output = Arc::new(TorqueSink::new());
    let session = Session::start(transport, output.clone(), fast_pipeline()).unwrap();
    assert_eq!(
        peer.recv_timeout(Duration::from_secs(1)).unwrap(),
        BridgeMessage::handshake()
    );

    let control = ControlLoop::spawn(
        Box::new(table),
        session.context().clone(),
        output,
        session.running_flag(),
        LoopConfig {
            period_ms: 20,
            max_iterations: Some(4),
        },
    )
    .unwrap();

    let seen = collect_until(&peer, Duration::from_secs(2), |seen| {
        seen.contains(&TorqueCommand::new(0.25, 0.75))
            && seen.contains(&TorqueCommand::new(-0.5, 0.5))
    });
    assert!(seen.contains(&TorqueCommand::new(0.25, 0.75)), "{:?}", seen);
    assert!(seen.contains(&TorqueCommand::new(-0.5, 0.5)), "{:?}", seen);

    let stats = control.join().unwrap();
    assert_eq!(stats.iterations, 4);

    // 表回放结束后输出零扭矩
    let seen = collect_until(&peer, Duration::from_secs(1), |seen| {
        seen.last() == Some(&TorqueCommand::ZERO)
    });
    assert_eq!(seen.last(), Some(&TorqueCommand::ZERO));
}

#[test]
fn test_manual_keys_drive_session() {
    let (transport, peer) = channel_transport(8);
    let output = Arc::new(TorqueSink::new());
    let session = Session::start(transport, output.clone(), fast_pipeline()).unwrap();

    let keys = Arc::new(KeyState::new());
    let control = ControlLoop::spawn(
        Box::new(ManualController::new(keys.clone())),
        session.context().clone(),
        output,
        session.running_flag(),
        LoopConfig {
            period_ms: 5,
            max_iterations: None,
        },
    )
    .unwrap();

    keys.set_held([Key::LeftForward, Key::RightForward]);
    let seen = collect_until(&peer, Duration::from_secs(2), |seen| {
        seen.last() == Some(&TorqueCommand::new(1.0, 1.0))
    });
    assert_eq!(seen.last(), Some(&TorqueCommand::new(1.0, 1.0)));

    keys.clear();
    let seen = collect_until(&peer, Duration::from_secs(2), |seen| {
        seen.last() == Some(&TorqueCommand::ZERO)
    });
    assert_eq!(seen.last(), Some(&TorqueCommand::ZERO));

    // 对端断开 → 会话结束 → 控制循环随之退出
    peer.close();
    assert!(session.wait_closed(Duration::from_secs(2)));
    let stats = control.join().unwrap();
    assert!(stats.iterations > 0);
}
