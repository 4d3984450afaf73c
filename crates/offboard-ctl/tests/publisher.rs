mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{controller, controller_with, pose_at, MockLink, Published};
use offboard_ctl::mode::ControlMode;
use offboard_ctl::{ControlConfig, FlightError};
use tokio::time::sleep;

#[tokio::test(start_paused = true)]
async fn both_loops_publish_at_fixed_rate() {
    let (ctl, link) = controller(MockLink::accepting());
    let publisher = ctl.start_publication();
    sleep(Duration::from_secs(1)).await;
    publisher.stop().await.unwrap();

    let setpoints = link.setpoints().len();
    let points = link.swarm_points().len();
    assert!((45..=51).contains(&setpoints), "setpoints={}", setpoints);
    assert!((45..=51).contains(&points), "swarm points={}", points);
}

#[tokio::test(start_paused = true)]
async fn stop_ends_publication() {
    let (ctl, link) = controller(MockLink::accepting());
    let publisher = ctl.start_publication();
    sleep(Duration::from_millis(200)).await;
    publisher.stop().await.unwrap();

    let before = link.published().len();
    sleep(Duration::from_millis(200)).await;
    assert_eq!(link.published().len(), before);
}

#[tokio::test(start_paused = true)]
async fn controller_shutdown_ends_publication() {
    let (ctl, link) = controller(MockLink::accepting());
    let publisher = ctl.start_publication();
    sleep(Duration::from_millis(100)).await;
    ctl.shutdown().trigger();
    sleep(Duration::from_millis(50)).await;

    let before = link.swarm_points().len();
    sleep(Duration::from_millis(200)).await;
    assert_eq!(link.swarm_points().len(), before);
    publisher.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn mode_switch_is_exclusive_for_the_next_cycle() {
    let (ctl, link) = controller(MockLink::accepting());
    let publisher = ctl.start_publication();
    assert_eq!(ctl.active_command().mode, ControlMode::Velocity);

    ctl.attitude_target(0.1, 0.0, 0.0, 0.6);
    sleep(Duration::from_millis(100)).await;
    assert!(link.published().iter().any(|p| matches!(p, Published::Attitude(_))));

    link.clear();
    ctl.switch_mode(ControlMode::Velocity);
    assert!(!ctl.active_command().attitude_enabled());
    sleep(Duration::from_millis(30)).await;

    let published = link.published();
    assert!(!published.is_empty());
    assert!(published.iter().all(|p| matches!(p, Published::Setpoint(_))));
    publisher.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn swarm_point_includes_vehicle_origin() {
    let cfg = ControlConfig { swarm_origin: [1.0, 2.0, 0.0], ..ControlConfig::default() };
    let (ctl, link) = controller_with(cfg, MockLink::accepting());
    ctl.on_pose(pose_at(0.5, 0.0, 1.0)).unwrap();

    let publisher = ctl.start_publication();
    sleep(Duration::from_millis(50)).await;
    publisher.stop().await.unwrap();

    let last = *link.swarm_points().last().expect("swarm point published");
    assert_eq!((last.x, last.y, last.z), (1.5, 2.0, 1.0));
}

#[tokio::test(start_paused = true)]
async fn stalled_loop_is_aborted_and_the_other_still_joined() {
    let (ctl, link) = controller(MockLink { stall_setpoints: true, ..MockLink::accepting() });
    let publisher = ctl.start_publication();
    sleep(Duration::from_millis(100)).await;
    assert!(!link.swarm_points().is_empty());
    assert!(link.setpoints().is_empty());

    let err = publisher.stop().await.unwrap_err();
    assert!(matches!(err, FlightError::Timeout { op: "publication stop", .. }));

    // both loops have released their link handle: test + controller remain
    sleep(Duration::from_millis(10)).await;
    assert_eq!(Arc::strong_count(&link), 2);
    let points = link.swarm_points().len();
    sleep(Duration::from_millis(200)).await;
    assert_eq!(link.swarm_points().len(), points);
}
