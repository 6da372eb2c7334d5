//! End-to-end frame update scenarios: one configuration, one frame,
//! assertions on the emitted task packet stream.

use glam::Vec3;
use reef::compound::{CompoundAttrs, CompoundTree};
use reef::config::Settings;
use reef::model::{
    Eye, Eyes, FrustumData, FrustumKind, Observer, PixelViewport, StereoMode, Tasks, View,
    Viewport, Wall,
};
use reef::protocol::{wire, AddressedPacket, TaskPacket};
use reef::server::cluster::{ChannelId, ClusterBuilder, DrawableConfig};
use reef::server::config::ClientEvent;
use reef::server::Config;

fn count<F: Fn(&TaskPacket) -> bool>(packets: &[AddressedPacket], predicate: F) -> usize {
    packets
        .iter()
        .filter(|packet| predicate(&packet.packet.body))
        .count()
}

fn position<F: Fn(&TaskPacket) -> bool>(packets: &[AddressedPacket], predicate: F) -> Option<usize> {
    packets
        .iter()
        .position(|packet| predicate(&packet.packet.body))
}

fn draws(packets: &[AddressedPacket]) -> Vec<&AddressedPacket> {
    packets
        .iter()
        .filter(|packet| matches!(packet.packet.body, TaskPacket::ChannelFrameDraw { .. }))
        .collect()
}

#[test]
fn s1_mono_single_channel_clear_draw() {
    let mut builder = ClusterBuilder::new();
    let node = builder.node("render0");
    let pipe = builder.pipe(node);
    let window = builder.window(pipe, DrawableConfig::default());
    let channel = builder.channel(window, "channel0", PixelViewport::new(0, 0, 1280, 1024));
    let cluster = builder.build();

    let mut tree = CompoundTree::new();
    tree.add_root(CompoundAttrs {
        channel: Some(channel),
        tasks: Tasks::CLEAR | Tasks::DRAW,
        ..Default::default()
    });

    let mut config = Config::new(cluster, tree, Settings::default()).expect("config");
    let packets = config.update_frame(0, 1).expect("frame");

    assert_eq!(
        count(&packets, |body| matches!(
            body,
            TaskPacket::ChannelFrameClear { .. }
        )),
        1
    );
    assert_eq!(
        count(&packets, |body| matches!(
            body,
            TaskPacket::ChannelFrameDraw { .. }
        )),
        1
    );
    assert_eq!(
        count(&packets, |body| matches!(
            body,
            TaskPacket::ChannelFrameDrawFinish
        )),
        1
    );
    assert_eq!(
        count(&packets, |body| matches!(
            body,
            TaskPacket::WindowFrameDrawFinish
        )),
        1
    );
    assert_eq!(
        count(&packets, |body| matches!(body, TaskPacket::PipeFrameDrawFinish)),
        1
    );
    assert_eq!(
        count(&packets, |body| matches!(body, TaskPacket::NodeFrameDrawFinish)),
        1
    );

    // The clear precedes the draw, the draw precedes the cascade.
    let clear = position(&packets, |body| {
        matches!(body, TaskPacket::ChannelFrameClear { .. })
    })
    .unwrap();
    let draw = position(&packets, |body| {
        matches!(body, TaskPacket::ChannelFrameDraw { .. })
    })
    .unwrap();
    let finish = position(&packets, |body| {
        matches!(body, TaskPacket::ChannelFrameDrawFinish)
    })
    .unwrap();
    assert!(clear < draw && draw < finish);
}

#[test]
fn s2_quad_stereo_buffers_and_late_finish() {
    let mut builder = ClusterBuilder::new();
    let node = builder.node("render0");
    let pipe = builder.pipe(node);
    let window = builder.window(
        pipe,
        DrawableConfig {
            stereo: true,
            doublebuffered: true,
        },
    );
    let channel = builder.channel(window, "channel0", PixelViewport::new(0, 0, 1280, 1024));
    let cluster = builder.build();

    let mut tree = CompoundTree::new();
    tree.add_root(CompoundAttrs {
        channel: Some(channel),
        tasks: Tasks::CLEAR | Tasks::DRAW,
        eyes: Some(Eyes::STEREO),
        stereo_mode: Some(StereoMode::Quad),
        ..Default::default()
    });

    let mut config = Config::new(cluster, tree, Settings::default()).expect("config");
    config.set_active_eyes(Eyes::STEREO);
    let packets = config.update_frame(0, 1).expect("frame");

    let draws = draws(&packets);
    assert_eq!(draws.len(), 2);
    let buffers: Vec<u32> = draws
        .iter()
        .map(|packet| match &packet.packet.body {
            TaskPacket::ChannelFrameDraw { context, .. } => context.buffer,
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(buffers, vec![wire::BUFFER_BACK_LEFT, wire::BUFFER_BACK_RIGHT]);

    // The channel finish arrives only after the right-eye draw.
    assert_eq!(
        count(&packets, |body| matches!(
            body,
            TaskPacket::ChannelFrameDrawFinish
        )),
        1
    );
    let second_draw = packets
        .iter()
        .enumerate()
        .filter(|(_, packet)| {
            matches!(packet.packet.body, TaskPacket::ChannelFrameDraw { .. })
        })
        .map(|(index, _)| index)
        .nth(1)
        .unwrap();
    let finish = position(&packets, |body| {
        matches!(body, TaskPacket::ChannelFrameDrawFinish)
    })
    .unwrap();
    assert!(finish > second_draw);
}

#[test]
fn s3_two_tiles_offset_by_half_the_width() {
    let mut builder = ClusterBuilder::new();
    let node = builder.node("render0");
    let pipe = builder.pipe(node);
    let window = builder.window(pipe, DrawableConfig::default());
    let a = builder.channel(window, "a", PixelViewport::new(0, 0, 1280, 1024));
    let b = builder.channel(window, "b", PixelViewport::new(0, 0, 1280, 1024));
    let cluster = builder.build();

    let mut tree = CompoundTree::new();
    tree.add_root(CompoundAttrs {
        channel: Some(a),
        viewport: Viewport::new(0.0, 0.0, 0.5, 1.0),
        tasks: Tasks::DRAW,
        ..Default::default()
    });
    tree.add_root(CompoundAttrs {
        channel: Some(b),
        viewport: Viewport::new(0.5, 0.0, 0.5, 1.0),
        tasks: Tasks::DRAW,
        ..Default::default()
    });

    let mut config = Config::new(cluster, tree, Settings::default()).expect("config");
    let packets = config.update_frame(0, 1).expect("frame");

    let draws = draws(&packets);
    assert_eq!(draws.len(), 2);
    let pvps: Vec<PixelViewport> = draws
        .iter()
        .map(|packet| match &packet.packet.body {
            TaskPacket::ChannelFrameDraw { context, .. } => context.pvp,
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(pvps[0], PixelViewport::new(0, 0, 640, 1024));
    assert_eq!(pvps[1], PixelViewport::new(640, 0, 640, 1024));

    let offsets: Vec<[i32; 2]> = draws
        .iter()
        .map(|packet| match &packet.packet.body {
            TaskPacket::ChannelFrameDraw { context, .. } => context.offset,
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(offsets[1][0] - offsets[0][0], 640);
}

/// Two-node cluster: channel on node 1 reads back, channels on other
/// nodes assemble.
struct ComposedSetup {
    config: Config,
    producer_channel: ChannelId,
}

fn composed_config(extra_consumers: &[(usize, &str)]) -> ComposedSetup {
    // extra_consumers: (node index 2.., channel name); node 1 hosts
    // the producer, node 2 hosts the first consumer.
    let mut builder = ClusterBuilder::new();
    let node1 = builder.node("render0");
    let pipe1 = builder.pipe(node1);
    let window1 = builder.window(pipe1, DrawableConfig::default());
    let producer = builder.channel(window1, "src", PixelViewport::new(0, 0, 1280, 1024));

    let node2 = builder.node("render1");
    let pipe2 = builder.pipe(node2);
    let window2 = builder.window(pipe2, DrawableConfig::default());
    let consumer = builder.channel(window2, "dst", PixelViewport::new(0, 0, 1280, 1024));

    let mut extra_channels = Vec::new();
    for (node_index, name) in extra_consumers {
        let channel = match node_index {
            1 => builder.channel(window1, *name, PixelViewport::new(0, 0, 1280, 1024)),
            2 => builder.channel(window2, *name, PixelViewport::new(0, 0, 1280, 1024)),
            _ => {
                let node = builder.node(format!("render{node_index}"));
                let pipe = builder.pipe(node);
                let window = builder.window(pipe, DrawableConfig::default());
                builder.channel(window, *name, PixelViewport::new(0, 0, 1280, 1024))
            }
        };
        extra_channels.push(channel);
    }
    let cluster = builder.build();

    let mut tree = CompoundTree::new();
    let source = tree.add_root(CompoundAttrs {
        channel: Some(producer),
        tasks: Tasks::CLEAR | Tasks::DRAW | Tasks::READBACK,
        ..Default::default()
    });
    let sink = tree.add_root(CompoundAttrs {
        channel: Some(consumer),
        tasks: Tasks::ASSEMBLE,
        ..Default::default()
    });
    let mut extra_sinks = Vec::new();
    for channel in &extra_channels {
        extra_sinks.push(tree.add_root(CompoundAttrs {
            channel: Some(*channel),
            tasks: Tasks::ASSEMBLE,
            ..Default::default()
        }));
    }

    let mut config = Config::new(cluster, tree, Settings::default()).expect("config");
    config.add_output_frame(source, "frame.composite").expect("output");
    config.add_input_frame(sink, "frame.composite").expect("input");
    for sink in extra_sinks {
        config.add_input_frame(sink, "frame.composite").expect("input");
    }
    config.connect_frames();
    ComposedSetup {
        config,
        producer_channel: producer,
    }
}

#[test]
fn s4_readback_transmit_assemble_across_nodes() {
    let ComposedSetup {
        mut config,
        producer_channel,
    } = composed_config(&[]);
    let packets = config.update_frame(0, 1).expect("frame");

    let readbacks: Vec<_> = packets
        .iter()
        .filter(|packet| {
            matches!(packet.packet.body, TaskPacket::ChannelFrameReadback { .. })
        })
        .collect();
    assert_eq!(readbacks.len(), 1);

    let transmits: Vec<_> = packets
        .iter()
        .filter(|packet| {
            matches!(packet.packet.body, TaskPacket::ChannelFrameTransmit { .. })
        })
        .collect();
    assert_eq!(transmits.len(), 1);
    let consumer_node_peer = {
        let cluster = config.cluster();
        let consumer_node = cluster
            .node_ids()
            .find(|node| cluster.node(*node).name == "render1")
            .unwrap();
        cluster.node(consumer_node).peer
    };
    match &transmits[0].packet.body {
        TaskPacket::ChannelFrameTransmit {
            frame_data, peer, ..
        } => {
            assert_eq!(*peer, consumer_node_peer);
            // Data version cycled for frame 0 is 1.
            assert_eq!(frame_data.version, 1);
        }
        _ => unreachable!(),
    }
    // Transmits are emitted by the producer's channel.
    let producer_route = config.cluster().channel(producer_channel).route;
    assert_eq!(transmits[0].packet.object, producer_route);

    let assembles: Vec<_> = packets
        .iter()
        .filter(|packet| {
            matches!(packet.packet.body, TaskPacket::ChannelFrameAssemble { .. })
        })
        .collect();
    assert_eq!(assembles.len(), 1);
    match &assembles[0].packet.body {
        TaskPacket::ChannelFrameAssemble { frames, .. } => {
            assert_eq!(frames.len(), 1);
            assert_eq!(frames[0].version, 1);
        }
        _ => unreachable!(),
    }

    // Only the drawing node reports a node draw finish.
    assert_eq!(
        count(&packets, |body| matches!(body, TaskPacket::NodeFrameDrawFinish)),
        1
    );
}

#[test]
fn transmit_dedup_one_per_distinct_peer() {
    // Consumers on node 2 (twice), node 3 (once) and the producer's
    // own node: one transmit per distinct remote peer.
    let ComposedSetup { mut config, .. } =
        composed_config(&[(2, "dst2"), (3, "dst3"), (1, "selfdst")]);

    let packets = config.update_frame(0, 1).expect("frame");
    let peers: Vec<_> = packets
        .iter()
        .filter_map(|packet| match &packet.packet.body {
            TaskPacket::ChannelFrameTransmit { peer, .. } => Some(*peer),
            _ => None,
        })
        .collect();
    assert_eq!(peers.len(), 2);
    assert_ne!(peers[0], peers[1]);
}

#[test]
fn s6_eye_behind_screen_produces_distinct_finite_frusta() {
    let wall = Wall {
        bottom_left: Vec3::new(-1.0, -1.0, -1.0),
        bottom_right: Vec3::new(1.0, -1.0, -1.0),
        top_left: Vec3::new(-1.0, 1.0, -1.0),
    };

    let frustum_for = |eye_z: f32| {
        let mut builder = ClusterBuilder::new();
        let node = builder.node("render0");
        let pipe = builder.pipe(node);
        let window = builder.window(pipe, DrawableConfig::default());
        let channel = builder.channel(window, "c", PixelViewport::new(0, 0, 1024, 1024));
        let cluster = builder.build();

        let mut tree = CompoundTree::new();
        tree.add_root(CompoundAttrs {
            channel: Some(channel),
            tasks: Tasks::DRAW,
            frustum: Some(FrustumData::from_wall(&wall, FrustumKind::Fixed)),
            ..Default::default()
        });

        let mut config = Config::new(cluster, tree, Settings::default()).expect("config");
        let mut view = View::new();
        view.set_wall(wall);
        let mut observer = Observer::new(0.06);
        // Slightly off-axis so the mirrored branch differs.
        observer.set_eye_position(Eye::Cyclop, Vec3::new(0.2, 0.0, eye_z));
        let view_index = config.add_view(view, Some(observer));
        config.set_channel_view(channel, view_index);

        let packets = config.update_frame(0, 1).expect("frame");
        packets
            .iter()
            .find_map(|packet| match &packet.packet.body {
                TaskPacket::ChannelFrameDraw { context, .. } => Some(context.frustum),
                _ => None,
            })
            .expect("draw packet")
    };

    // Wall plane sits at z == -1; in wall space the eye z is world
    // z + 1.
    let front = frustum_for(-1.0 + 1e-3);
    let behind = frustum_for(-1.0 - 1e-3);

    for frustum in [&front, &behind] {
        assert!(frustum.left.is_finite());
        assert!(frustum.right.is_finite());
        assert!(frustum.bottom.is_finite());
        assert!(frustum.top.is_finite());
    }
    assert!((front.left - behind.left).abs() > 1e-3);
    assert!((front.right - behind.right).abs() > 1e-3);
}

#[test]
fn draw_finish_cascade_is_idempotent_across_frames() {
    // Two drawing compounds on one channel: still one finish per
    // entity per frame, on the last compound.
    let mut builder = ClusterBuilder::new();
    let node = builder.node("render0");
    let pipe = builder.pipe(node);
    let window = builder.window(pipe, DrawableConfig::default());
    let channel = builder.channel(window, "c", PixelViewport::new(0, 0, 1280, 1024));
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

    let mut config = Config::new(cluster, tree, Settings::default()).expect("config");
    for frame_number in 0..3 {
        let packets = config
            .update_frame(frame_number, frame_number as u128 + 1)
            .expect("frame");
        assert_eq!(
            count(&packets, |body| matches!(
                body,
                TaskPacket::ChannelFrameDraw { .. }
            )),
            2
        );
        let finishes: [fn(&TaskPacket) -> bool; 4] = [
            |body| matches!(body, TaskPacket::ChannelFrameDrawFinish),
            |body| matches!(body, TaskPacket::WindowFrameDrawFinish),
            |body| matches!(body, TaskPacket::PipeFrameDrawFinish),
            |body| matches!(body, TaskPacket::NodeFrameDrawFinish),
        ];
        for predicate in finishes {
            assert_eq!(count(&packets, predicate), 1);
        }
        // The finish follows the second draw.
        let last_draw = packets
            .iter()
            .rposition(|packet| {
                matches!(packet.packet.body, TaskPacket::ChannelFrameDraw { .. })
            })
            .unwrap();
        let finish = position(&packets, |body| {
            matches!(body, TaskPacket::ChannelFrameDrawFinish)
        })
        .unwrap();
        assert!(finish > last_draw);
    }
}

#[test]
fn frame_completion_and_timeout() {
    let mut builder = ClusterBuilder::new();
    let node = builder.node("render0");
    let pipe = builder.pipe(node);
    let window = builder.window(pipe, DrawableConfig::default());
    let channel = builder.channel(window, "c", PixelViewport::new(0, 0, 640, 480));
    let cluster = builder.build();
    let node_uuid = cluster.node(node).object;

    let mut tree = CompoundTree::new();
    tree.add_root(CompoundAttrs {
        channel: Some(channel),
        tasks: Tasks::DRAW,
        ..Default::default()
    });

    let settings = Settings {
        frame_timeout: std::time::Duration::from_millis(0),
        ..Settings::default()
    };
    let mut config = Config::new(cluster, tree, settings).expect("config");

    let packets = config.update_frame(0, 1).expect("frame");
    assert_eq!(
        count(&packets, |body| matches!(body, TaskPacket::NodeFrameDrawFinish)),
        1
    );
    assert!(!config.is_frame_complete(0));
    assert!(config.notify_node_finish(node_uuid, 0));
    assert!(config.is_frame_complete(0));

    // Next frame is never acknowledged and times out immediately.
    let _ = config.update_frame(1, 2).expect("frame");
    assert!(!config.is_frame_complete(1));
    let expired = config.expire_frames();
    assert_eq!(expired, vec![1]);
}

#[test]
fn render_errors_do_not_stop_the_frame_loop() {
    let mut builder = ClusterBuilder::new();
    let node = builder.node("render0");
    let pipe = builder.pipe(node);
    let window = builder.window(pipe, DrawableConfig::default());
    let channel = builder.channel(window, "c", PixelViewport::new(0, 0, 640, 480));
    let cluster = builder.build();
    let node_uuid = cluster.node(node).object;

    let mut tree = CompoundTree::new();
    tree.add_root(CompoundAttrs {
        channel: Some(channel),
        tasks: Tasks::CLEAR | Tasks::DRAW,
        ..Default::default()
    });

    let mut config = Config::new(cluster, tree, Settings::default()).expect("config");
    let first = config.update_frame(0, 1).expect("frame");

    config.handle_event(ClientEvent::RenderError {
        channel,
        frame_number: 0,
        message: "framebuffer incomplete".into(),
    });
    config.handle_event(ClientEvent::NodeFrameFinished {
        node: node_uuid,
        frame_number: 0,
    });
    assert!(config.is_frame_complete(0));

    // The next frame emits the same task stream.
    let second = config.update_frame(1, 2).expect("frame");
    assert_eq!(first.len(), second.len());
}
