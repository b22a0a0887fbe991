//! Routes the records of a recording to the players registered for their
//! streams.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::converter::SharedCodec;
use crate::options::PlayerOptions;
use crate::player::{FramePlayer, ImuPlayer, StreamPlayer};
use crate::record::{ImageBlock, Record, RecordBlock, StreamId};
use crate::sink::Sink;

/// How many records were handed to players.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub records_read: u64,
    /// Records of streams that have no player.
    pub records_ignored: u64,
    /// Records whose remaining blocks were skipped because a player asked
    /// to stop.
    pub records_cut_short: u64,
}

/// Holds one player per stream and feeds records to them in order.
#[derive(Default)]
pub struct RecordDispatcher {
    players: BTreeMap<StreamId, Box<dyn StreamPlayer>>,
    stats: DispatchStats,
}

impl RecordDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a player for a stream, replacing (and shutting down) any
    /// player that was registered before.
    pub fn set_stream_player(&mut self, stream: StreamId, player: Box<dyn StreamPlayer>) {
        if let Some(mut old) = self.players.insert(stream, player) {
            old.shutdown();
        }
    }

    pub fn has_player(&self, stream: StreamId) -> bool {
        self.players.contains_key(&stream)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Create a player for every stream that has a kind of player: a
    /// [FramePlayer] for streams that might contain images and an [ImuPlayer]
    /// for streams that might contain IMU data. Other streams are skipped.
    ///
    /// Returns the number of players that were attached.
    pub fn attach_default_players(
        &mut self,
        streams: impl IntoIterator<Item = StreamId>,
        sink: &Arc<dyn Sink>,
        codec: &SharedCodec,
        options: &PlayerOptions,
    ) -> usize {
        let mut attached = 0;

        for stream in streams {
            let player: Box<dyn StreamPlayer> = if stream.might_contain_images() {
                log::info!("Stream {stream}: logging images.");
                Box::new(FramePlayer::new(
                    stream,
                    Arc::clone(sink),
                    Arc::clone(codec),
                    options,
                ))
            } else if stream.might_contain_imu_data() {
                log::info!("Stream {stream}: logging IMU data.");
                Box::new(ImuPlayer::new(stream, Arc::clone(sink), options))
            } else {
                log::info!("Stream {stream}: skipped, no player for this kind of stream.");
                continue;
            };

            self.set_stream_player(stream, player);
            attached += 1;
        }

        attached
    }

    /// Feed every record to its stream's player, block by block.
    pub fn read_all_records<'a>(&mut self, records: impl IntoIterator<Item = &'a Record>) {
        for record in records {
            self.read_record(record);
        }
    }

    /// Feed one record to its stream's player. A player returning `false`
    /// skips the record's remaining blocks.
    pub fn read_record(&mut self, record: &Record) {
        self.stats.records_read += 1;

        let Some(player) = self.players.get_mut(&record.info.stream) else {
            self.stats.records_ignored += 1;
            return;
        };

        for (index, block) in record.blocks.iter().enumerate() {
            let keep_reading = match block {
                RecordBlock::Metadata(layout) => player.on_metadata_read(&record.info, index, layout),
                RecordBlock::Image { spec, data } => {
                    player.on_image_read(&record.info, index, &ImageBlock { spec, data })
                }
            };

            if !keep_reading {
                if index + 1 < record.blocks.len() {
                    self.stats.records_cut_short += 1;
                }
                break;
            }
        }
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// Shut every player down, waiting for their background work.
    pub fn finish(&mut self) {
        for player in self.players.values_mut() {
            player.shutdown();
        }
    }
}

impl Drop for RecordDispatcher {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::codec::ImageCodec;
    use crate::frame::PixelLayout;
    use crate::record::{ImageSpec, MetadataLayout, MetadataValue, RecordInfo, RecordType, StreamKind};
    use crate::sink::{MemorySink, SinkEvent};

    #[derive(Default)]
    struct Calls {
        blocks: Vec<(StreamId, usize)>,
        shutdowns: usize,
    }

    /// Records every call and stops reading after `stop_at` blocks.
    struct Probe {
        calls: Arc<Mutex<Calls>>,
        stop_at: Option<usize>,
    }

    impl Probe {
        fn visit(&mut self, record: &RecordInfo, index: usize) -> bool {
            self.calls.lock().unwrap().blocks.push((record.stream, index));
            self.stop_at != Some(index)
        }
    }

    impl StreamPlayer for Probe {
        fn on_metadata_read(&mut self, record: &RecordInfo, index: usize, _: &MetadataLayout) -> bool {
            self.visit(record, index)
        }

        fn on_image_read(&mut self, record: &RecordInfo, index: usize, _: &ImageBlock<'_>) -> bool {
            self.visit(record, index)
        }

        fn shutdown(&mut self) {
            self.calls.lock().unwrap().shutdowns += 1;
        }
    }

    const CAMERA: StreamId = StreamId::new(StreamKind::Camera, 1);
    const IMU: StreamId = StreamId::new(StreamKind::Imu, 1);
    const OTHER: StreamId = StreamId::new(StreamKind::Other, 1);

    fn three_blocks(stream: StreamId) -> Record {
        let spec = ImageSpec::raw((1, 1).into(), PixelLayout::Grey8);
        Record::new(stream, RecordType::Data, 0.0)
            .with_metadata(MetadataLayout::new())
            .with_image(spec.clone(), vec![1])
            .with_image(spec, vec![2])
    }

    #[test]
    fn stops_a_record_when_a_player_says_so() {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let mut dispatcher = RecordDispatcher::new();
        dispatcher.set_stream_player(
            CAMERA,
            Box::new(Probe {
                calls: Arc::clone(&calls),
                stop_at: Some(1),
            }),
        );

        let records = [three_blocks(CAMERA), three_blocks(OTHER)];
        dispatcher.read_all_records(&records);

        assert_eq!(calls.lock().unwrap().blocks, vec![(CAMERA, 0), (CAMERA, 1)]);
        assert_eq!(
            dispatcher.stats(),
            DispatchStats {
                records_read: 2,
                records_ignored: 1,
                records_cut_short: 1,
            }
        );

        dispatcher.finish();
        assert_eq!(calls.lock().unwrap().shutdowns, 1);
    }

    #[test]
    fn replacing_a_player_shuts_the_old_one_down() {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let probe = || {
            Box::new(Probe {
                calls: Arc::clone(&calls),
                stop_at: None,
            })
        };

        let mut dispatcher = RecordDispatcher::new();
        dispatcher.set_stream_player(IMU, probe());
        dispatcher.set_stream_player(IMU, probe());

        assert_eq!(calls.lock().unwrap().shutdowns, 1);
        assert_eq!(dispatcher.player_count(), 1);
    }

    #[test]
    fn default_players_by_stream_kind() {
        let _ = env_logger::builder().is_test(true).try_init();
        let memory = Arc::new(MemorySink::new());
        let sink: Arc<dyn Sink> = memory.clone();
        let codec: SharedCodec = Arc::new(ImageCodec);

        let mut dispatcher = RecordDispatcher::new();
        let attached = dispatcher.attach_default_players(
            [CAMERA, IMU, OTHER],
            &sink,
            &codec,
            &PlayerOptions::default(),
        );

        assert_eq!(attached, 2);
        assert!(dispatcher.has_player(CAMERA));
        assert!(dispatcher.has_player(IMU));
        assert!(!dispatcher.has_player(OTHER));

        let imu_config = Record::new(IMU, RecordType::Configuration, 0.0).with_metadata(
            MetadataLayout::new().with("has_gyroscope", MetadataValue::Bool(true)),
        );
        let imu_data = Record::new(IMU, RecordType::Data, 0.1).with_metadata(
            MetadataLayout::new().with("gyroscope", MetadataValue::F32Array(vec![0.1, 0.2, 0.3])),
        );
        let records = [imu_config, three_blocks(CAMERA), imu_data];

        dispatcher.read_all_records(&records);
        dispatcher.finish();

        let paths: Vec<_> = memory
            .events()
            .iter()
            .map(|e| e.path().to_owned())
            .collect();
        assert!(paths.contains(&"\"imu-1\"/configuration".to_owned()));
        assert!(paths.contains(&"\"imu-1\"/gyroscope".to_owned()));
        assert!(paths.contains(&"\"camera-1\"/data".to_owned()));

        let images: Vec<_> = memory.images();
        assert_eq!(images.len(), 2);
        assert!(images.iter().all(|e| matches!(e, SinkEvent::Image { width: 1, height: 1, .. })));
    }
}
