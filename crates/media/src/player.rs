//! Players receive the blocks of one stream's records, in record order, and
//! log what they find to a [Sink](crate::sink::Sink).
//!
//! - [FramePlayer] handles camera streams. Images are decoded on a worker
//!   thread (except the first one) so reading never waits on decoding.
//! - [ImuPlayer] handles IMU and magnetometer streams.

mod frame_player;
mod imu_player;

pub use frame_player::*;
pub use imu_player::*;

use crate::record::{ImageBlock, MetadataLayout, RecordInfo, RecordType};
use crate::sink::Sink;

/// Handles the blocks of records from one stream.
///
/// Both methods return whether the rest of the record's blocks should be read.
pub trait StreamPlayer: Send {
    fn on_metadata_read(
        &mut self,
        record: &RecordInfo,
        block_index: usize,
        layout: &MetadataLayout,
    ) -> bool;

    fn on_image_read(
        &mut self,
        record: &RecordInfo,
        block_index: usize,
        block: &ImageBlock<'_>,
    ) -> bool;

    /// Called once no more records will arrive. Players with background work
    /// should finish it before returning.
    fn shutdown(&mut self) {}
}

/// Sets the record's time and logs configuration records as static text at
/// `<entity>/configuration`. Shared by all players.
fn log_record_metadata(
    sink: &dyn Sink,
    entity_path: &str,
    timestamp_timeline: &str,
    record: &RecordInfo,
    layout: &MetadataLayout,
) {
    sink.set_time_seconds(timestamp_timeline, record.timestamp);

    if record.record_type == RecordType::Configuration {
        sink.log_static_text(&format!("{entity_path}/configuration"), &layout.to_string());
    }
}
