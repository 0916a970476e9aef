use anyhow::Context as AnyhowContext;
use log::{debug, info};
use rayon::prelude::*;
use tracing::Span;
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::config::Config;
use crate::dataset::FrameSource;
use crate::descriptor::DescriptorParams;
use crate::emitter::{Emitter, Record};
use crate::error::{Error, Result};
use crate::frame::{FrameBuffers, ScaleFrame};
use crate::image::ColorImage;
use crate::my_types::*;
use crate::optical_flow::OpticalFlow;
use crate::pyramid::{scale_levels, ScaleLevel};
use crate::sampler::DenseSampler;
use crate::tracker::{AdvanceOutcome, TrackStore};
use crate::trajectory::TrajectoryValidator;
use crate::visualization::Visualizer;

/// Counters for one processed frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frame_number: usize,
    /// Tracks alive at all scales after the frame
    pub live: usize,
    pub seeded: usize,
    pub out_of_bounds: usize,
    /// Tracks that reached the maximum length
    pub completed: usize,
    pub emitted: usize,
    /// Completed tracks dropped by the validator
    pub rejected: usize,
}

/// Multi-scale dense trajectory extraction over a stream of frames.
#[derive(Debug)]
pub struct DenseTracker {
    config: Config,
    sampler: DenseSampler,
    optical_flow: OpticalFlow,
    validator: TrajectoryValidator,
    params: DescriptorParams,
    /// Fixed by the first frame
    scales: Vec<ScaleLevel>,
    stores: Vec<TrackStore>,
    prev: Option<FrameBuffers>,
    unused: Option<FrameBuffers>,
    // Frame pairs since the last re-seed
    init_counter: usize,
    // Incremented after processing a frame. 0 before the first frame.
    frame_number: usize,
}

impl DenseTracker {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(DenseTracker {
            sampler: DenseSampler::new(config.quality, config.min_distance),
            optical_flow: OpticalFlow::new(&config)?,
            validator: TrajectoryValidator::new(&config),
            params: DescriptorParams::from_config(&config),
            scales: vec![],
            stores: vec![],
            prev: None,
            unused: None,
            init_counter: 0,
            frame_number: 0,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn scales(&self) -> &[ScaleLevel] {
        &self.scales
    }

    pub fn frame_number(&self) -> usize {
        self.frame_number
    }

    pub fn live_count(&self) -> usize {
        self.stores.iter().map(TrackStore::len).sum()
    }

    /// Polylines of the live tracks at the finest scale, in pixels.
    pub fn live_tracks(&self) -> Vec<Vec<Vector2f>> {
        self.stores
            .first()
            .map(|store| store.tracks().iter().map(|t| t.points().to_vec()).collect())
            .unwrap_or_default()
    }

    /// Track from the previous frame into `input` and hand every accepted
    /// trajectory to `emitter`. The first frame only seeds.
    pub fn process_frame(
        &mut self,
        input: &ColorImage,
        emitter: &mut dyn Emitter,
    ) -> Result<FrameStats> {
        if input.is_empty() {
            return Err(Error::EmptyFrame);
        }
        if self.scales.is_empty() {
            self.initialize(input)?;
        }

        let frame = FrameBuffers::new(
            input,
            &self.scales,
            &self.optical_flow,
            self.unused.take(),
        )?;
        let mut stats = FrameStats {
            frame_number: self.frame_number,
            ..Default::default()
        };

        match self.prev.take() {
            None => {
                stats.seeded = self.reseed(&frame);
            }
            Some(prev) => {
                self.track(&prev, &frame, emitter, &mut stats)?;
                self.init_counter += 1;
                if self.init_counter == self.config.track_info().gap {
                    stats.seeded = self.reseed(&frame);
                    self.init_counter = 0;
                }
                self.unused = Some(prev);
            }
        }
        self.prev = Some(frame);
        self.frame_number += 1;

        stats.live = self.live_count();
        debug!("{stats:?}");
        Ok(stats)
    }

    fn initialize(&mut self, input: &ColorImage) -> Result<()> {
        let c = &self.config;
        self.scales = scale_levels(
            input.width,
            input.height,
            c.patch_size,
            c.scale_num,
            c.scale_ratio,
        )?;
        self.stores = self
            .scales
            .iter()
            .map(|level| TrackStore::new(*level, c.track_info(), self.params.clone()))
            .collect();
        info!(
            "{}x{} frames, {} scales",
            input.width,
            input.height,
            self.scales.len()
        );
        Ok(())
    }

    fn track(
        &mut self,
        prev: &FrameBuffers,
        frame: &FrameBuffers,
        emitter: &mut dyn Emitter,
        stats: &mut FrameStats,
    ) -> Result<()> {
        let flows = self.optical_flow.compute(&prev.poly, &frame.poly);
        let params = &self.params;

        // scales are independent, results come back in scale order
        let outcomes: Vec<AdvanceOutcome> = self
            .stores
            .par_iter_mut()
            .zip(flows.into_par_iter())
            .map(|(store, flow)| {
                let level = store.level;
                let snapshot = ScaleFrame::new(level, prev.level(level.index), flow, params);
                store.advance(&snapshot)
            })
            .collect();

        for outcome in outcomes {
            stats.out_of_bounds += outcome.out_of_bounds;
            stats.completed += outcome.completed.len();
            for track in outcome.completed {
                match self.validator.validate(&track.points) {
                    Some(shape) => {
                        emitter.emit(&Record::new(shape, track))?;
                        stats.emitted += 1;
                    }
                    None => stats.rejected += 1,
                }
            }
        }
        Ok(())
    }

    fn reseed(&mut self, frame: &FrameBuffers) -> usize {
        let sampler = &self.sampler;
        self.stores
            .par_iter_mut()
            .map(|store| store.reseed(frame.level(store.level.index), sampler))
            .sum()
    }
}

/// Totals over a run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Frames read from the source, including skipped ones
    pub frames: usize,
    pub processed: usize,
    pub completed: usize,
    pub emitted: usize,
    pub rejected: usize,
}

/// Feed the frames `start_frame..=end_frame` of `source` through `tracker`.
/// Stops early when the source runs dry or the visualizer asks to.
pub fn run(
    source: &mut dyn FrameSource,
    tracker: &mut DenseTracker,
    emitter: &mut dyn Emitter,
    visualizer: &mut dyn Visualizer,
    start_frame: usize,
    end_frame: Option<usize>,
) -> anyhow::Result<RunSummary> {
    let mut summary = RunSummary::default();

    loop {
        let index = summary.frames;
        if end_frame.is_some_and(|end| index > end) {
            break;
        }
        let Some(frame) = source
            .next_frame()
            .with_context(|| format!("Failed to read frame {index}"))?
        else {
            break;
        };
        summary.frames += 1;
        if index < start_frame {
            continue;
        }

        let stats = tracker
            .process_frame(&frame, emitter)
            .with_context(|| format!("Failed to process frame {index}"))?;
        summary.processed += 1;
        summary.completed += stats.completed;
        summary.emitted += stats.emitted;
        summary.rejected += stats.rejected;

        Span::current().pb_inc(1);

        if !visualizer.show(&frame, &tracker.live_tracks())? {
            info!("stopped by the viewer at frame {index}");
            break;
        }
    }

    emitter.flush()?;
    info!(
        "{} frames processed, {} of {} trajectories emitted",
        summary.processed, summary.emitted, summary.completed
    );
    Ok(summary)
}
