use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nalgebra::Vector3;
use tracing::{debug, info, warn};

use offboard_ctl::shutdown::Shutdown;
use offboard_ctl::{ControlConfig, FlightError, OffboardController};
use offboard_fc::autodetect::{autodetect_fc, default_candidate_bauds, default_candidate_devs, AutodetectResult};
use offboard_fc::mav::{MavLink, Telemetry};
use offboard_fc::{resolve_endpoint, LinkConfig};

use std::sync::Arc;
use std::time::Duration;

mod mission;

use mission::{MissionCfg, TakeoffKind};

#[derive(Debug, Parser)]
#[command(name = "offboard", version, about = "Offboard flight control for PX4 swarm vehicles")]
struct Cli {
    #[arg(long)]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate the config without touching the vehicle.
    Doctor,
    Link { #[command(subcommand)] cmd: LinkCmd },
    /// Fly the configured mission.
    Run,
}

#[derive(Debug, Subcommand)]
enum LinkCmd {
    /// Probe serial ports/bauds for MAVLink heartbeats.
    Autodetect,
    /// Connect, listen for one heartbeat timeout and print the link status.
    Status,
}

#[derive(Debug, serde::Deserialize)]
struct Config {
    #[serde(default)]
    control: ControlConfig,
    link: LinkConfig,
    #[serde(default)]
    mission: MissionCfg,
}

fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).context("read config")?;
    toml::from_str(&s).context("parse config toml")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    match cli.cmd {
        Command::Doctor => doctor(&cfg)?,
        Command::Link { cmd } => link_cmd(&cfg, cmd).await?,
        Command::Run => run(&cfg).await?,
    }
    Ok(())
}

fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");

    cfg.control.check().map_err(anyhow::Error::msg)?;

    let link = &cfg.link;
    if let Some(url) = &link.url {
        anyhow::ensure!(!url.is_empty(), "link.url is empty");
        info!("doctor: link url {}", url);
    } else if link.autodetect {
        info!("doctor: link autodetect enabled (OK)");
    } else {
        anyhow::ensure!(link.serial_dev.as_ref().map(|s| !s.is_empty()).unwrap_or(false), "link.serial_dev missing");
        anyhow::ensure!(link.baud.unwrap_or(0) > 0, "link.baud invalid");
    }

    cfg.mission.check(&cfg.control).map_err(anyhow::Error::msg)?;

    info!("doctor: OK");
    Ok(())
}

async fn link_cmd(cfg: &Config, cmd: LinkCmd) -> Result<()> {
    match cmd {
        LinkCmd::Autodetect => {
            let res = run_link_autodetect(&cfg.link)?;
            if let Some((dev, baud)) = res.chosen {
                println!("CHOSEN: {} @ {}", dev, baud);
            } else {
                println!("CHOSEN: none");
            }
            for p in res.probes {
                println!("probe dev={} baud={} hb={} {}ms note={}", p.dev, p.baud, p.hb_seen, p.elapsed_ms, p.note);
            }
            Ok(())
        }
        LinkCmd::Status => {
            let url = resolve_endpoint(&cfg.link)?;
            let link = Arc::new(MavLink::open(&cfg.link, &url).context("link open")?);
            let stop = Shutdown::new();
            let _hb = link.spawn_heartbeat(stop.subscribe());
            let _reader = link.spawn_reader(stop.subscribe(), |_| {});
            tokio::time::sleep(cfg.link.heartbeat_timeout()).await;
            stop.trigger();

            let st = link.status();
            println!("connected={}", st.connected);
            println!("endpoint={:?}", st.endpoint);
            println!("last_heartbeat_age={:?}", st.hb_age());
            if let Some(v) = &st.vehicle {
                println!("armed={} mode={}", v.armed, v.mode);
            }
            println!("messages={} last_msg={:?}", st.messages, st.last_msg);
            Ok(())
        }
    }
}

fn run_link_autodetect(link: &LinkConfig) -> Result<AutodetectResult> {
    autodetect_fc(
        link.candidate_devs.clone().unwrap_or_else(default_candidate_devs),
        link.candidate_bauds.clone().unwrap_or_else(default_candidate_bauds),
        link.heartbeat_timeout(),
    )
}

fn dispatch(ctl: &OffboardController, t: Telemetry) {
    let res = match t {
        Telemetry::Pose(p) => ctl.on_pose(p),
        Telemetry::Velocity(v) => ctl.on_velocity(v),
        Telemetry::Status(s) => {
            ctl.on_status(s);
            Ok(())
        }
        Telemetry::Rc(rc) => {
            ctl.on_rc(&rc);
            Ok(())
        }
    };
    if let Err(e) = res {
        debug!("telemetry dropped: {}", e);
    }
}

async fn run(cfg: &Config) -> Result<()> {
    info!("run: starting");
    cfg.control.check().map_err(anyhow::Error::msg)?;
    cfg.mission.check(&cfg.control).map_err(anyhow::Error::msg)?;

    let url = resolve_endpoint(&cfg.link)?;
    let link = Arc::new(MavLink::open(&cfg.link, &url).context("link open")?);
    let ctl = Arc::new(OffboardController::new(cfg.control.clone(), link.clone()));

    // The link outlives the controller's shutdown so landing can still be
    // acknowledged after Ctrl-C.
    let link_stop = Shutdown::new();
    let _hb = link.spawn_heartbeat(link_stop.subscribe());
    let sink = ctl.clone();
    let _reader = link.spawn_reader(link_stop.subscribe(), move |t| dispatch(&sink, t));

    let shutdown = ctl.shutdown().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("ctrl-c: shutting down");
            shutdown.trigger();
        }
    });

    let publisher = ctl.start_publication();
    let res = fly(&ctl, &cfg.mission).await;
    if let Err(e) = &res {
        warn!("mission aborted: {:#}", e);
        if ctl.status().armed {
            info!("run: landing after abort");
            ctl.land().await;
        }
    }

    ctl.shutdown().trigger();
    if let Err(e) = publisher.stop().await {
        warn!("run: {}", e);
    }
    link_stop.trigger();
    info!("run: done");
    res
}

async fn fly(ctl: &OffboardController, m: &MissionCfg) -> Result<()> {
    let est = ctl.wait_pose_ready(m.pose_timeout()).await.context("waiting for pose")?;
    info!(
        "run: pose ready at [{:.2} {:.2} {:.2}] yaw={:.2}",
        est.position_geo.x, est.position_geo.y, est.position_geo.z, est.attitude.yaw
    );

    if m.wait_rc_task {
        wait_task_switch(ctl, m.rc_timeout()).await?;
    }

    match m.takeoff {
        TakeoffKind::Ramp => ctl.takeoff(m.climb_speed, m.height).await?,
        TakeoffKind::Position => ctl.takeoff_position(m.height).await?,
    }

    for (i, wp) in m.waypoints.iter().enumerate() {
        info!("run: waypoint {}/{} [{:.2} {:.2} {:.2}]", i + 1, m.waypoints.len(), wp[0], wp[1], wp[2]);
        ctl.move_to_swarm_point(Vector3::new(wp[0], wp[1], wp[2]), m.speed).await?;
    }

    if m.land && !ctl.land().await {
        anyhow::bail!("land request not accepted");
    }
    Ok(())
}

async fn wait_task_switch(ctl: &OffboardController, timeout: Duration) -> Result<(), FlightError> {
    info!("run: waiting for RC task switch (ch{})", ctl.config().task_channel);
    let start = tokio::time::Instant::now();
    while !ctl.task_ready() {
        if ctl.shutdown().is_triggered() {
            return Err(FlightError::Cancelled("rc task wait"));
        }
        if start.elapsed() >= timeout {
            return Err(FlightError::Timeout { op: "rc task wait", after: timeout });
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    info!("run: task switch high");
    Ok(())
}
