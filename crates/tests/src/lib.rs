//! # Integration Tests
//!
//! Cross-crate end-to-end tests.
//!
//! Covers:
//! - configuration file -> manager
//! - live ingestion from device threads
//! - record then play back, slider mapping over a real recording

#[cfg(test)]
mod support {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use contracts::{
        DataItem, DataSourceFactory, DeviceHandler, ItemCallback, Payload, Result, SourceConfig,
        TrackingData,
    };
    use parking_lot::Mutex;

    pub const FED_TYPE: &str = "fed";

    /// Device whose items are pushed by the test
    #[derive(Default)]
    pub struct FedDevice {
        callback: Mutex<Option<ItemCallback>>,
        listening: AtomicBool,
    }

    impl FedDevice {
        pub fn feed(&self, timestamp_ns: u64, duration_ns: u64) {
            let callback = self.callback.lock().clone();
            if let Some(callback) = callback {
                callback(DataItem::new(
                    timestamp_ns,
                    duration_ns,
                    Payload::Tracking(TrackingData::identity(&["stylus"])),
                ));
            }
        }
    }

    impl DeviceHandler for FedDevice {
        fn device_type(&self) -> &str {
            FED_TYPE
        }

        fn update(&self, _item: &DataItem) -> Result<bool> {
            Ok(true)
        }

        fn listen(&self, callback: ItemCallback) {
            *self.callback.lock() = Some(callback);
            self.listening.store(true, Ordering::SeqCst);
        }

        fn stop(&self) {
            self.listening.store(false, Ordering::SeqCst);
        }

        fn is_listening(&self) -> bool {
            self.listening.load(Ordering::SeqCst)
        }
    }

    #[derive(Default)]
    pub struct FedFactory {
        pub devices: Mutex<Vec<Arc<FedDevice>>>,
    }

    impl FedFactory {
        pub fn device(&self, index: usize) -> Arc<FedDevice> {
            Arc::clone(&self.devices.lock()[index])
        }
    }

    impl DataSourceFactory for FedFactory {
        fn display_name(&self) -> &str {
            "Fed"
        }

        fn device_type(&self) -> &str {
            FED_TYPE
        }

        fn create(&self, _config: &SourceConfig) -> Result<Arc<dyn DeviceHandler>> {
            let device = Arc::new(FedDevice::default());
            self.devices.lock().push(Arc::clone(&device));
            Ok(device)
        }
    }
}

#[cfg(test)]
mod config_tests {
    use std::sync::Arc;

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{Clock, ManagerMode, SystemClock};
    use source_manager::{DataSourceManager, FactoryRegistry};

    #[test]
    fn test_config_file_builds_manager() {
        let content = r#"
frames_per_second = 40

[[sources]]
factory = "Mock Tracker"
config = { name = "tracker", properties = { rate_hz = "120", tools = "needle" } }

[[sources]]
factory = "Mock Frame Grabber"
config = { properties = { width = "16", height = "8" } }
"#;
        let config = ConfigLoader::load_from_str(content, ConfigFormat::Toml).unwrap();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let registry = FactoryRegistry::new(devices::default_factories(Arc::clone(&clock))).unwrap();

        let manager = DataSourceManager::from_config(registry, clock, config).unwrap();
        assert_eq!(manager.mode(), ManagerMode::Live);
        assert_eq!(
            manager.source_names(),
            vec!["tracker", "Mock Frame Grabber-1"]
        );
        assert_eq!(
            manager.factory_for_row(1).unwrap().device_type(),
            devices::MOCK_FRAME_GRABBER_TYPE
        );
        assert!(manager.is_update_timer_on());
    }

    #[test]
    fn test_unknown_factory_in_config() {
        let content = "[[sources]]\nfactory = \"Aurora\"\n";
        let config = ConfigLoader::load_from_str(content, ConfigFormat::Toml).unwrap();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let registry = FactoryRegistry::new(devices::default_factories(Arc::clone(&clock))).unwrap();

        assert!(DataSourceManager::from_config(registry, clock, config).is_err());
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use contracts::{
        Clock, ContractError, DataItem, DataSourceFactory, ManagerConfig, ManagerEvent,
        ManualClock, SourceConfig, SourceEntryConfig, SystemClock, NANOS_PER_MILLI,
        NANOS_PER_SECOND,
    };
    use parking_lot::Mutex;
    use source_manager::{DataSourceManager, FactoryRegistry, ManagerRunner};
    use sync_engine::{DataSource, SourceBuffer};

    use crate::support::{FedFactory, FED_TYPE};

    fn fed_manager(config: ManagerConfig) -> (DataSourceManager, Arc<FedFactory>, Arc<ManualClock>) {
        let factory = Arc::new(FedFactory::default());
        let clock = Arc::new(ManualClock::new(10 * NANOS_PER_SECOND));
        let registry =
            FactoryRegistry::new(vec![Arc::clone(&factory) as Arc<dyn DataSourceFactory>])
                .unwrap();
        let manager =
            DataSourceManager::new(registry, Arc::clone(&clock) as Arc<dyn Clock>, config)
                .unwrap();
        (manager, factory, clock)
    }

    /// Three items at 1000, 2000, 3000: rate and nearest lookup
    #[test]
    fn test_three_item_scenario() {
        let buffer = SourceBuffer::new();
        for ts in [1000u64, 2000, 3000] {
            buffer
                .append(DataItem::new(
                    ts,
                    500,
                    contracts::Payload::Raw {
                        data: Default::default(),
                    },
                ))
                .unwrap();
        }

        let rate = buffer.estimate_frame_rate().unwrap();
        assert!((rate - 1_000_000.0).abs() < 1e-6);
        assert_eq!(buffer.nearest_to(2100).unwrap().timestamp_ns(), 2000);
    }

    /// Tolerance 1000 ns, item valid for 500 ns, delta 600 ns -> stale
    #[test]
    fn test_tolerance_gate_through_source() {
        let factory = FedFactory::default();
        let config = SourceConfig {
            tolerance_ns: Some(1000),
            ..Default::default()
        };
        let handler = factory.create(&config).unwrap();
        let source = Arc::new(DataSource::new("fed", handler, &config));
        assert_eq!(source.tolerance_ns(), 1000);
        source.start_acquisition();

        factory.device(0).feed(10_000, 500);
        let resolution = source.request_data(10_600);
        assert_eq!(resolution.delta_ns(), 600);
        assert!(!source.is_current_within_tolerance(&resolution));
        assert!(!source.process_data(10_600));
        assert!(source.process_data(10_400));
    }

    /// Long-lived item: the source tolerance is the binding limit
    #[test]
    fn test_source_tolerance_ceiling() {
        let factory = FedFactory::default();
        let config = SourceConfig {
            tolerance_ns: Some(1000),
            ..Default::default()
        };
        let handler = factory.create(&config).unwrap();
        let source = Arc::new(DataSource::new("fed", handler, &config));
        source.start_acquisition();

        factory.device(0).feed(10_000, 1_000_000);

        let at_limit = source.request_data(11_000);
        assert_eq!(at_limit.delta_ns(), 1000);
        assert!(!source.is_current_within_tolerance(&at_limit));

        let beyond = source.request_data(12_500);
        assert!(!source.is_current_within_tolerance(&beyond));
        assert!(!source.process_data(12_500));

        let inside = source.request_data(10_999);
        assert!(source.is_current_within_tolerance(&inside));
        assert!(source.process_data(10_999));
    }

    /// Device threads feed the sources while the tick runs on the caller
    #[test]
    fn test_live_ingestion_with_device_threads() {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let registry = FactoryRegistry::new(devices::default_factories(Arc::clone(&clock))).unwrap();
        let mut tracker = SourceConfig::default();
        tracker.properties.insert("rate_hz".into(), "200".into());
        let mut grabber = SourceConfig::default();
        grabber.properties.insert("rate_hz".into(), "100".into());

        let config = ManagerConfig {
            sources: vec![
                SourceEntryConfig {
                    factory: devices::MockTrackerFactory::DISPLAY_NAME.into(),
                    config: tracker,
                },
                SourceEntryConfig {
                    factory: devices::MockFrameGrabberFactory::DISPLAY_NAME.into(),
                    config: grabber,
                },
            ],
            ..Default::default()
        };
        let mut manager = DataSourceManager::from_config(registry, clock, config).unwrap();

        std::thread::sleep(Duration::from_millis(300));
        let mut statuses = Vec::new();
        for _ in 0..5 {
            statuses = manager.on_tick();
            std::thread::sleep(Duration::from_millis(20));
        }

        assert_eq!(statuses.len(), 2);
        // Tracker poses stay valid for a second
        assert!(statuses[0].is_current, "tracker not current");
        for status in &statuses {
            assert!(status.actual_timestamp_ns > 0, "{} resolved nothing", status.name);
            assert!(status.frame_rate_hz > 0.0);
            assert!(status.buffer_len > 0);
        }

        manager.remove_all_sources();
    }

    #[test]
    fn test_record_then_play_back() {
        let dir = tempfile::tempdir().unwrap();
        let (mut manager, factory, clock) = fed_manager(ManagerConfig::default());
        let mut events = manager.subscribe();

        manager.add_source("Fed", SourceConfig::default()).unwrap();
        manager.add_source("Fed", SourceConfig::default()).unwrap();
        let session = manager
            .start_recording(Some(dir.path().join("session")))
            .unwrap();

        let base = clock.now_ns();
        for i in 0..20 {
            let ts = base + i * 50 * NANOS_PER_MILLI;
            factory.device(0).feed(ts, 100 * NANOS_PER_MILLI);
            if i % 2 == 0 {
                factory.device(1).feed(ts + NANOS_PER_MILLI, 100 * NANOS_PER_MILLI);
            }
            clock.set(ts);
            manager.on_tick();
        }
        assert_eq!(manager.stop_recording().as_deref(), Some(session.as_path()));

        let range = manager.start_playback(&session, None).unwrap();
        assert_eq!(range.start_ns, base);
        assert_eq!(range.end_ns, base + 19 * 50 * NANOS_PER_MILLI);
        assert_eq!(manager.source_count(), 2);
        assert_eq!(manager.source(0).unwrap().buffer_len(), 20);
        assert_eq!(manager.source(1).unwrap().buffer_len(), 10);
        assert_eq!(manager.source(0).unwrap().device_type(), FED_TYPE);

        // Scrub forwards then backwards
        for offset_ms in [500u64, 900, 100] {
            let t = base + offset_ms * NANOS_PER_MILLI;
            manager.set_playback_time(t).unwrap();
            let statuses = manager.on_tick();
            assert_eq!(statuses[0].actual_timestamp_ns, t);
            assert!(statuses[0].is_current);
        }

        manager.stop_playback();
        assert_eq!(manager.source_names(), vec!["Fed-0", "Fed-1"]);

        let mut saw_started = false;
        let mut saw_stopped = false;
        while let Ok(event) = events.try_recv() {
            match event {
                ManagerEvent::RecordingStarted { .. } => saw_started = true,
                ManagerEvent::RecordingStopped => saw_stopped = true,
                _ => {}
            }
        }
        assert!(saw_started && saw_stopped);
    }

    /// A one second recording on a 1000 unit slider
    #[test]
    fn test_slider_round_trip_over_recording() {
        let dir = tempfile::tempdir().unwrap();
        let (mut manager, factory, clock) = fed_manager(ManagerConfig {
            slider_resolution: 1000,
            ..Default::default()
        });

        manager.add_source("Fed", SourceConfig::default()).unwrap();
        manager.start_recording(Some(dir.path().to_path_buf())).unwrap();
        let t0 = clock.now_ns();
        factory.device(0).feed(t0, NANOS_PER_SECOND);
        factory.device(0).feed(t0 + NANOS_PER_SECOND, NANOS_PER_SECOND);
        manager.stop_recording();

        let range = manager.start_playback(dir.path(), None).unwrap();
        assert_eq!(range.slider_max, 1000);
        // One tick at 20 Hz is 50ms of a 1ms-per-unit slider
        assert_eq!(range.slider_single_step, 50);
        assert_eq!(range.slider_page_step, 1000);

        for v in 0..=1000 {
            let t = manager.compute_time_from_slider(v).unwrap();
            assert_eq!(manager.compute_playback_time_slider_value(t).unwrap(), v);
        }
        assert_eq!(
            manager
                .compute_playback_time_slider_value_from_text(&(t0 + NANOS_PER_SECOND / 2).to_string())
                .unwrap(),
            500
        );
        assert!(manager
            .compute_playback_time_slider_value_from_text("half past")
            .is_err());
    }

    #[test]
    fn test_playback_with_unregistered_device_type() {
        let dir = tempfile::tempdir().unwrap();
        let (mut manager, factory, _clock) = fed_manager(ManagerConfig::default());
        manager.add_source("Fed", SourceConfig::default()).unwrap();
        manager.start_recording(Some(dir.path().to_path_buf())).unwrap();
        factory.device(0).feed(NANOS_PER_SECOND, NANOS_PER_SECOND);
        manager.stop_recording();

        // Play the recording back in a manager that only knows the mock devices
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let registry = FactoryRegistry::new(devices::default_factories(Arc::clone(&clock))).unwrap();
        let mut other = DataSourceManager::new(registry, clock, ManagerConfig::default()).unwrap();
        let err = other.start_playback(dir.path(), None).unwrap_err();
        assert!(matches!(err, ContractError::NotFound { .. }));
        assert!(!other.is_playing_back());
    }

    #[tokio::test]
    async fn test_runner_drives_live_manager() {
        let (mut manager, factory, _clock) = fed_manager(ManagerConfig {
            frames_per_second: 100,
            ..Default::default()
        });
        let mut events = manager.subscribe();
        manager.add_source("Fed", SourceConfig::default()).unwrap();
        factory.device(0).feed(10 * NANOS_PER_SECOND, NANOS_PER_SECOND);

        let manager = Arc::new(Mutex::new(manager));
        let runner = ManagerRunner::spawn(Arc::clone(&manager));

        let event = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match events.recv().await {
                    Some(ManagerEvent::UpdateFinished { statuses, .. }) => return statuses,
                    Some(_) => continue,
                    None => panic!("event channel closed"),
                }
            }
        })
        .await
        .unwrap();

        assert!(event[0].is_current);
        assert!(runner.shutdown().await >= 1);
    }
}
