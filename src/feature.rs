use crate::config::TrackInfo;
use crate::descriptor::{DescriptorKind, DescriptorParams};
use crate::my_types::*;
use crate::pyramid::ScaleLevel;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    /// The flow carried the point off the image
    OutOfBounds,
    MaxLengthReached,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackState {
    /// Created by the sampler, a single point
    Seeded,
    Active,
    Terminated(Termination),
}

/// A point followed through the flow fields of one scale, together with
/// the descriptors sampled along the way.
#[derive(Clone, Debug)]
pub struct Track {
    points: Vec<Vector2f>,
    length: usize,
    state: TrackState,
    /// Per descriptor kind, `nt_cells` blocks of one spatial sample each
    descriptors: [Vec<f32>; 4],
    nt_cells: usize,
    pub scale_index: usize,
    pub scale: f32,
}

/// A finished track, in level-0 pixel units, with every temporal cell
/// averaged over the samples it received.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletedTrack {
    pub points: Vec<Vector2f>,
    pub scale: f32,
    pub descriptors: [Vec<f32>; 4],
}

impl Track {
    pub fn new(
        point: Vector2f,
        track_info: &TrackInfo,
        params: &DescriptorParams,
        level: &ScaleLevel,
    ) -> Self {
        let mut points = Vec::with_capacity(track_info.length + 1);
        points.push(point);
        Track {
            points,
            length: track_info.length,
            state: TrackState::Seeded,
            descriptors: DescriptorKind::ALL.map(|kind| vec![0.; params.get(kind).total_dim()]),
            nt_cells: params.configs[0].nt_cells,
            scale_index: level.index,
            scale: level.scale,
        }
    }

    /// Number of successful advances so far
    pub fn index(&self) -> usize {
        self.points.len() - 1
    }

    /// Most recent position, in level coordinates
    pub fn point(&self) -> Vector2f {
        self.points[self.index()]
    }

    pub fn points(&self) -> &[Vector2f] {
        &self.points
    }

    pub fn state(&self) -> TrackState {
        self.state
    }

    pub fn descriptor(&self, kind: DescriptorKind) -> &[f32] {
        &self.descriptors[kind.index()]
    }

    /// Add a sample taken at the current index into its temporal cell.
    pub fn accumulate(&mut self, kind: DescriptorKind, sample: &[f32]) {
        let cell = temporal_cell(self.index(), self.length, self.nt_cells);
        let desc = &mut self.descriptors[kind.index()];
        let dim = desc.len() / self.nt_cells;
        assert_eq!(sample.len(), dim);
        for (d, s) in desc[cell * dim..(cell + 1) * dim].iter_mut().zip(sample) {
            *d += s;
        }
    }

    pub fn add_point(&mut self, point: Vector2f) {
        assert!(
            !matches!(self.state, TrackState::Terminated(_)),
            "cannot extend a terminated track"
        );
        self.points.push(point);
        self.state = if self.index() >= self.length {
            TrackState::Terminated(Termination::MaxLengthReached)
        } else {
            TrackState::Active
        };
    }

    pub fn terminate(&mut self, reason: Termination) {
        self.state = TrackState::Terminated(reason);
    }

    pub fn complete(self) -> CompletedTrack {
        let scale = self.scale;
        let (length, nt_cells) = (self.length, self.nt_cells);
        let descriptors = self.descriptors.map(|mut desc| {
            let dim = desc.len() / nt_cells;
            for cell in 0..nt_cells {
                let count = cell_samples(cell, length, nt_cells);
                if count > 0 {
                    let norm = 1. / count as f32;
                    desc[cell * dim..(cell + 1) * dim]
                        .iter_mut()
                        .for_each(|v| *v *= norm);
                }
            }
            desc
        });
        CompletedTrack {
            points: self.points.iter().map(|p| p * scale).collect(),
            scale,
            descriptors,
        }
    }
}

/// Temporal cell receiving the sample taken at step `index`; the tail of
/// an uneven split goes to the last cell.
pub fn temporal_cell(index: usize, length: usize, nt_cells: usize) -> usize {
    let stride = usize::max(length / nt_cells, 1);
    usize::min(index / stride, nt_cells - 1)
}

/// How many of the `length` samples of a trajectory land in `cell`
pub fn cell_samples(cell: usize, length: usize, nt_cells: usize) -> usize {
    (0..length)
        .filter(|&i| temporal_cell(i, length, nt_cells) == cell)
        .count()
}
