use log::trace;

use crate::config::TrackInfo;
use crate::descriptor::{DescriptorKind, DescriptorParams, RectInfo};
use crate::feature::{CompletedTrack, Termination, Track, TrackState};
use crate::frame::ScaleFrame;
use crate::image::Image;
use crate::my_types::*;
use crate::pyramid::ScaleLevel;
use crate::sampler::DenseSampler;

#[derive(Debug, Default)]
pub struct AdvanceOutcome {
    /// Tracks that reached the maximum length during this advance
    pub completed: Vec<CompletedTrack>,
    pub out_of_bounds: usize,
}

/// Live tracks of one scale.
#[derive(Debug)]
pub struct TrackStore {
    pub level: ScaleLevel,
    tracks: Vec<Track>,
    track_info: TrackInfo,
    params: DescriptorParams,
}

impl TrackStore {
    pub fn new(level: ScaleLevel, track_info: TrackInfo, params: DescriptorParams) -> Self {
        TrackStore {
            level,
            tracks: vec![],
            track_info,
            params,
        }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn current_points(&self) -> Vec<Vector2f> {
        self.tracks.iter().map(|t| t.point()).collect()
    }

    /// Start a track at each of `points`, in order.
    pub fn seed(&mut self, points: &[Vector2f]) {
        self.tracks.extend(
            points
                .iter()
                .map(|p| Track::new(*p, &self.track_info, &self.params, &self.level)),
        );
    }

    /// Sample `grey` away from the live tracks and seed the new points.
    /// Returns how many tracks were added.
    pub fn reseed(&mut self, grey: &Image, sampler: &DenseSampler) -> usize {
        let points = sampler.sample(grey, &self.current_points());
        self.seed(&points);
        points.len()
    }

    /// Move every track by the flow of `frame`, sampling its descriptors at
    /// the position it leaves. Tracks that leave the image are dropped,
    /// tracks that reach the maximum length are handed back.
    pub fn advance(&mut self, frame: &ScaleFrame) -> AdvanceOutcome {
        let (width, height) = (frame.level.width, frame.level.height);
        let patch_size = self.params.configs[0].patch_size;
        let mut outcome = AdvanceOutcome::default();
        let mut survivors = Vec::with_capacity(self.tracks.len());

        for mut track in std::mem::take(&mut self.tracks) {
            let prev = track.point();
            let next = prev + frame.flow_at(&prev);
            if next.x <= 0. || next.x >= width as f32 || next.y <= 0. || next.y >= height as f32 {
                track.terminate(Termination::OutOfBounds);
                outcome.out_of_bounds += 1;
                continue;
            }

            let rect = RectInfo::around(&prev, width, height, patch_size);
            for kind in DescriptorKind::ALL {
                let sample = frame.descriptors.get(kind).describe(
                    &rect,
                    self.params.get(kind),
                    self.params.epsilon,
                );
                track.accumulate(kind, &sample);
            }
            track.add_point(next);

            match track.state() {
                TrackState::Terminated(Termination::MaxLengthReached) => {
                    outcome.completed.push(track.complete())
                }
                _ => survivors.push(track),
            }
        }

        self.tracks = survivors;
        trace!(
            "scale {}: {} live, {} completed, {} out of bounds",
            self.level.index,
            self.tracks.len(),
            outcome.completed.len(),
            outcome.out_of_bounds
        );
        outcome
    }
}
