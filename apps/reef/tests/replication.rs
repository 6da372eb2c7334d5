//! View replication between a master and its slaves.

use glam::Vec3;
use reef::model::{View, ViewKind, Wall};
use reef::object::{MasterCell, ObjectError, VERSION_HEAD};

fn test_wall() -> Wall {
    Wall {
        bottom_left: Vec3::new(-1.0, -0.5, -2.0),
        bottom_right: Vec3::new(1.0, -0.5, -2.0),
        top_left: Vec3::new(-1.0, 0.5, -2.0),
    }
}

#[test]
fn s5_each_delta_carries_exactly_its_touched_field() {
    let mut master = MasterCell::new(View::new());
    let mut slave = master.attach_slave(View::new()).expect("attach");

    master.body_mut().set_wall(test_wall());
    let first = master.commit().expect("wall commit");
    // type tag + dirty mask + 9 wall floats
    assert_eq!(first.payload.len(), 4 + 4 + 9 * 4);
    assert_eq!(first.version, 1);

    master.body_mut().set_eye_base(0.065);
    let second = master.commit().expect("eye base commit");
    // type tag + dirty mask + eye base
    assert_eq!(second.payload.len(), 4 + 4 + 4);
    assert_eq!(second.version, 2);

    // The slave applies both deltas in order.
    slave.sync(1).expect("sync to wall");
    assert_eq!(slave.body().kind(), ViewKind::Wall);
    assert_eq!(*slave.body().wall(), test_wall());
    assert_eq!(slave.body().eye_base(), 0.0);

    slave.sync(2).expect("sync to eye base");
    assert_eq!(slave.body().eye_base(), 0.065);
}

#[test]
fn late_slave_maps_at_the_current_version() {
    let mut master = MasterCell::new(View::new());
    master.body_mut().set_wall(test_wall());
    master.body_mut().set_name("front");
    master.commit().expect("commit");

    // Mapping after the commit hands over full instance data.
    let slave = master.attach_slave(View::new()).expect("attach");
    assert_eq!(slave.version(), master.version());
    assert_eq!(slave.body().name(), "front");
    assert_eq!(*slave.body().wall(), test_wall());
}

#[test]
fn sync_to_head_and_version_errors() {
    let mut master = MasterCell::new(View::new());
    let mut slave = master.attach_slave(View::new()).expect("attach");

    master.body_mut().set_eye_base(0.06);
    master.commit().expect("commit");
    master.body_mut().set_eye_base(0.07);
    master.commit().expect("commit");

    assert_eq!(slave.sync(VERSION_HEAD).expect("head"), 2);
    assert_eq!(slave.body().eye_base(), 0.07);

    match slave.sync(9) {
        Err(ObjectError::Version { requested, head }) => {
            assert_eq!(requested, 9);
            assert_eq!(head, 2);
        }
        other => panic!("expected version error, got {other:?}"),
    }
}

#[test]
fn untouched_master_emits_no_delta() {
    let mut master = MasterCell::new(View::new());
    master.body_mut().set_wall(test_wall());
    master.commit().expect("commit");
    assert!(master.commit().is_none());
    assert_eq!(master.version(), 1);
}
