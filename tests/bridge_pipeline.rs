//! End-to-end tests: envelopes in through a channel, rows out on disk.

use adl_bridge::clock::FixedClock;
use adl_bridge::config::BridgeConfig;
use adl_bridge::queue::{ChannelSender, ChannelSource};
use adl_bridge::record::{Envelope, EnvironmentalSample, FixedPoint};
use adl_bridge::{Bridge, ConsumerState};
use chrono::{NaiveDate, NaiveDateTime};
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const HEADER: &str = ";SignalType,SerialIndex,time,HomeOwner,Location,press,temp,humid,gas_raw,iaq,s_iaq,eco2,bvoc,gas_percent,clear,Action,Type";

fn at(day: u32, hour: u32, min: u32, sec: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2023, 5, day)
        .unwrap()
        .and_hms_opt(hour, min, sec)
        .unwrap()
}

fn test_config(dir: &Path) -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.storage.data_dir = dir.to_path_buf();
    config.queue.poll_interval_ms = 10;
    config
}

fn start(dir: &Path, clock: FixedClock) -> (ChannelSender, Bridge) {
    let (tx, source) = ChannelSource::pair();
    let bridge = Bridge::spawn(source, &test_config(dir), clock).expect("bridge starts");
    (tx, bridge)
}

/// Block until the bridge has finished handling `count` envelopes.
fn wait_received(bridge: &Bridge, count: u64) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let stats = bridge.stats();
        if stats.rows_written + stats.malformed + stats.write_failures >= count {
            break;
        }
        assert!(Instant::now() < deadline, "timed out waiting for {count} messages");
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

fn reference_sample() -> EnvironmentalSample {
    EnvironmentalSample::from([
        FixedPoint::new(1, 2),
        FixedPoint::new(3, 4),
        FixedPoint::new(5, 6),
        FixedPoint::new(7, 8),
        FixedPoint::new(9, 0),
        FixedPoint::new(1, 1),
        FixedPoint::new(2, 2),
        FixedPoint::new(3, 3),
        FixedPoint::new(4, 4),
    ])
}

#[test]
fn test_mixed_traffic_is_written_in_order() {
    let dir = TempDir::new().unwrap();
    let (tx, bridge) = start(dir.path(), FixedClock::new(at(12, 10, 0, 0)));

    tx.send(Envelope::environmental(&reference_sample())).unwrap();
    tx.send(Envelope::device("door_open\n").unwrap()).unwrap();
    tx.send(Envelope::sound("loud_noise").unwrap()).unwrap();
    wait_received(&bridge, 3);

    let stats = bridge.shutdown();
    assert_eq!(stats.rows_written, 3);

    let lines = read_lines(&dir.path().join("2023.05.12.dat"));
    assert_eq!(
        lines,
        vec![
            HEADER.to_string(),
            "E,0,2023-05-12 10:00:00,HMK,Toilet,1.2,3.4,5.6,7.8,9.0,1.1,2.2,3.3,4.4".to_string(),
            "D,1,2023-05-12 10:00:00,door_open".to_string(),
            "S,2,2023-05-12 10:00:00,loud_noise".to_string(),
        ]
    );
}

#[test]
fn test_unknown_kind_writes_nothing_and_keeps_sequence() {
    let dir = TempDir::new().unwrap();
    let (tx, bridge) = start(dir.path(), FixedClock::new(at(12, 10, 0, 1)));

    tx.send(Envelope::new(7, b"mystery").unwrap()).unwrap();
    tx.send(Envelope::device("door_open").unwrap()).unwrap();
    wait_received(&bridge, 2);

    assert_eq!(bridge.state(), ConsumerState::Receiving);
    let stats = bridge.shutdown();
    assert_eq!(stats.malformed, 1);
    assert_eq!(stats.rows_written, 1);

    let lines = read_lines(&dir.path().join("2023.05.12.dat"));
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1], "D,0,2023-05-12 10:00:01,door_open");
}

#[test]
fn test_day_rollover_starts_a_new_file_with_header() {
    let dir = TempDir::new().unwrap();
    let clock = FixedClock::new(at(12, 23, 59, 58));
    let (tx, bridge) = start(dir.path(), clock.clone());

    tx.send(Envelope::device("before").unwrap()).unwrap();
    wait_received(&bridge, 1);
    clock.set(at(13, 0, 0, 2));
    tx.send(Envelope::device("after").unwrap()).unwrap();
    wait_received(&bridge, 2);
    bridge.shutdown();

    let first = read_lines(&dir.path().join("2023.05.12.dat"));
    let second = read_lines(&dir.path().join("2023.05.13.dat"));
    assert_eq!(first, vec![HEADER, "D,0,2023-05-12 23:59:58,before"]);
    assert_eq!(second, vec![HEADER, "D,1,2023-05-13 00:00:02,after"]);
}

#[test]
fn test_restart_appends_without_second_header() {
    let dir = TempDir::new().unwrap();
    let clock = FixedClock::new(at(12, 8, 0, 0));

    for text in ["first_run", "second_run"] {
        let (tx, bridge) = start(dir.path(), clock.clone());
        tx.send(Envelope::device(text).unwrap()).unwrap();
        wait_received(&bridge, 1);
        bridge.shutdown();
    }

    let lines = read_lines(&dir.path().join("2023.05.12.dat"));
    assert_eq!(
        lines,
        vec![
            HEADER,
            "D,0,2023-05-12 08:00:00,first_run",
            "D,0,2023-05-12 08:00:00,second_run",
        ]
    );
}

#[test]
fn test_empty_leftover_file_gets_header() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("2023.05.12.dat");
    fs::write(&path, b"").unwrap();

    let (tx, bridge) = start(dir.path(), FixedClock::new(at(12, 9, 30, 0)));
    tx.send(Envelope::sound("chime").unwrap()).unwrap();
    wait_received(&bridge, 1);
    bridge.shutdown();

    assert_eq!(read_lines(&path), vec![HEADER, "S,0,2023-05-12 09:30:00,chime"]);
}

#[test]
fn test_site_labels_come_from_config() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.site.home_owner = "JDOE".into();
    config.site.location = "Kitchen".into();

    let (tx, source) = ChannelSource::pair();
    let bridge = Bridge::spawn(source, &config, FixedClock::new(at(12, 10, 0, 0))).unwrap();
    tx.send(Envelope::environmental(&reference_sample())).unwrap();
    wait_received(&bridge, 1);
    bridge.shutdown();

    let lines = read_lines(&dir.path().join("2023.05.12.dat"));
    assert!(lines[1].starts_with("E,0,2023-05-12 10:00:00,JDOE,Kitchen,1.2,"));
}

#[test]
fn test_shutdown_without_traffic_creates_no_file() {
    let dir = TempDir::new().unwrap();
    let (_tx, bridge) = start(dir.path(), FixedClock::new(at(12, 10, 0, 0)));

    let start = Instant::now();
    let stats = bridge.shutdown();
    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(stats.received, 0);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}
