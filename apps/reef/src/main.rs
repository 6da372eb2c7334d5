use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use reef::anim::CameraAnimation;
use reef::compound::{CompoundAttrs, CompoundTree};
use reef::config::Settings;
use reef::model::{PixelViewport, Tasks, View, Viewport, Wall};
use reef::server::cluster::{ClusterBuilder, DrawableConfig};
use reef::server::Config;
use reef::telemetry::logging::{self, LogConfig, LogLevel};
use reef::transport::PacketDispatcher;
use reef_bus::{Bus, LocalBus};

#[derive(Parser, Debug)]
#[command(name = "reef", about = "Parallel rendering frame orchestrator")]
struct Cli {
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    #[arg(long, help = "Write structured logs to a file")]
    log_file: Option<PathBuf>,

    #[arg(long, help = "Camera animation to replay while rendering")]
    animation: Option<PathBuf>,

    #[arg(long, default_value_t = 10, help = "Number of frames to render")]
    frames: u32,
}

/// A 2x1 tiled demo configuration on one node.
fn demo_config(settings: Settings) -> anyhow::Result<Config> {
    let mut builder = ClusterBuilder::new();
    let node = builder.node("render0");
    let pipe = builder.pipe(node);
    let window = builder.window(pipe, DrawableConfig::default());
    let channel = builder.channel(window, "channel0", PixelViewport::new(0, 0, 1280, 1024));
    let cluster = builder.build();

    let mut tree = CompoundTree::new();
    let root = tree.add_root(CompoundAttrs {
        channel: Some(channel),
        tasks: Tasks::CLEAR,
        ..Default::default()
    });
    for tile in 0..2 {
        tree.add_child(
            root,
            CompoundAttrs {
                viewport: Viewport::new(tile as f32 * 0.5, 0.0, 0.5, 1.0),
                tasks: Tasks::DRAW,
                ..Default::default()
            },
        );
    }

    let mut config = Config::new(cluster, tree, settings).context("invalid demo config")?;
    let mut view = View::new();
    view.set_wall(Wall::default());
    view.set_name("demo");
    let view_index = config.add_view(view, None);
    config.set_channel_view(channel, view_index);
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(&LogConfig {
        level: cli.log_level,
        file: cli.log_file.clone(),
    })
    .context("logging setup failed")?;

    let mut animation = match &cli.animation {
        Some(path) => {
            let animation = CameraAnimation::load(path)
                .with_context(|| format!("loading animation {}", path.display()))?;
            Some(animation)
        }
        None => None,
    };

    let settings = Settings::from_env();
    let mut config = demo_config(settings)?;

    let bus = Arc::new(LocalBus::new());
    let mut dispatcher = PacketDispatcher::new(bus.clone());
    let _rx = bus.subscribe(reef_bus::PeerId(1))?;

    for frame_number in 0..cli.frames {
        if let Some(animation) = animation.as_mut() {
            let step = animation.next_step();
            info!(
                target = "reef::demo",
                frame = step.frame,
                x = step.translation.x,
                y = step.translation.y,
                z = step.translation.z,
                "camera"
            );
        }
        let packets = config.update_frame(frame_number, frame_number as u128 + 1)?;
        let sent = dispatcher.dispatch_all(&packets);
        info!(
            target = "reef::demo",
            frame_number,
            emitted = packets.len(),
            sent,
            "frame dispatched"
        );
        config.expire_frames();
    }

    Ok(())
}
