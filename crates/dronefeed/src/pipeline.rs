use crate::shutdown::ShutdownSignal;
use crate::stage::{Stage, StageIo, StageStatus};

/// Produces input frames for the pipeline. `None` ends the stream.
pub trait FrameSource {
    fn next_frame(&mut self) -> Option<StageIo>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    SourceExhausted,
    /// Index of the stage whose transform returned `Stop`.
    StageStopped(usize),
    ShutdownRaised,
    /// Index of the stage whose open returned `Stop`.
    OpenFailed(usize),
}

#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Frames that went through every stage.
    pub frames: u64,
    pub exit: ExitReason,
    /// Output of the last stage for the last completed frame.
    pub last_output: Option<StageIo>,
}

/// Host driver: opens every stage, pushes frames through them in order and
/// closes them again, in reverse, however the run ends.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    shutdown: ShutdownSignal,
}

impl Pipeline {
    pub fn new(shutdown: ShutdownSignal) -> Self {
        Self {
            stages: Vec::new(),
            shutdown,
        }
    }

    pub fn add_stage(&mut self, stage: Box<dyn Stage>) {
        self.stages.push(stage);
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn run(&mut self, source: &mut dyn FrameSource) -> PipelineReport {
        let mut report = PipelineReport {
            frames: 0,
            exit: ExitReason::SourceExhausted,
            last_output: None,
        };

        let mut opened = 0;
        for (index, stage) in self.stages.iter_mut().enumerate() {
            if stage.open() == StageStatus::Stop {
                log::error!("Stage '{}' failed to open", stage.name());
                report.exit = ExitReason::OpenFailed(index);
                break;
            }
            opened += 1;
        }

        if opened == self.stages.len() {
            let exit = self.pump(source, &mut report);
            report.exit = exit;
        }

        for stage in self.stages[..opened].iter_mut().rev() {
            stage.close();
        }
        log::info!(
            "Pipeline finished after {} frames: {:?}",
            report.frames,
            report.exit
        );
        self.shutdown.mark_exited();
        report
    }

    fn pump(&mut self, source: &mut dyn FrameSource, report: &mut PipelineReport) -> ExitReason {
        loop {
            if self.shutdown.is_raised() {
                return ExitReason::ShutdownRaised;
            }
            let Some(mut io) = source.next_frame() else {
                return ExitReason::SourceExhausted;
            };

            for (index, stage) in self.stages.iter_mut().enumerate() {
                let mut output = StageIo::default();
                if stage.transform(&io, &mut output) == StageStatus::Stop {
                    log::info!("Stage '{}' requested stop", stage.name());
                    return ExitReason::StageStopped(index);
                }
                // Stages that produce nothing pass their input through.
                if output.buffer.is_some() {
                    io = output;
                }
            }
            report.frames += 1;
            report.last_output = Some(io);
        }
    }
}
