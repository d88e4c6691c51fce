//! Shared helpers for the protocol integration tests.
//!
//! The pipeline is synchronous and takes the current time as an argument, so
//! every helper here drives it with an explicit [`Instant`] instead of
//! sleeping.

#![allow(dead_code)]

use probelink_core::EngineConfig;
use probelink_protocol::{LinkPipeline, PipelineEvent};
use std::time::Duration;
use tokio::time::Instant;

/// Pipeline with default configuration.
pub fn pipeline() -> LinkPipeline {
    LinkPipeline::new(&EngineConfig::default())
}

/// Feed `data` split at the given cut points, collecting every event.
pub fn feed_split(
    pipeline: &mut LinkPipeline,
    data: &[u8],
    cuts: &[usize],
    now: Instant,
) -> Vec<PipelineEvent> {
    let mut points: Vec<usize> = cuts.iter().map(|c| c % (data.len() + 1)).collect();
    points.push(0);
    points.push(data.len());
    points.sort_unstable();
    points.dedup();

    points
        .windows(2)
        .flat_map(|w| pipeline.feed(&data[w[0]..w[1]], now))
        .collect()
}

pub fn lines(events: &[PipelineEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::Line(l) => Some(l.clone()),
            _ => None,
        })
        .collect()
}

pub fn records(events: &[PipelineEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::Record(r) => Some(r.clone()),
            _ => None,
        })
        .collect()
}

pub fn binaries(events: &[PipelineEvent]) -> Vec<Vec<u8>> {
    events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::Binary(b) => Some(b.to_vec()),
            _ => None,
        })
        .collect()
}

/// A time comfortably past every idle threshold.
pub fn later(now: Instant) -> Instant {
    now + Duration::from_secs(10)
}

/// Build a binary transfer as the firmware prints it.
pub fn binary_transfer(payload: &[u8]) -> Vec<u8> {
    let mut data = format!("SD:READ:LENGTH:{}\r\n", payload.len()).into_bytes();
    data.extend_from_slice(payload);
    data.extend_from_slice(b"\nSD:READ:END:");
    data
}
