//! Device tasks

use crate::memory::DevicePtr;
use crate::progress::Progress;
use crate::tile::TileQueue;
use kernel::integrator::{ShaderEvalType, ShaderInput};
use std::sync::Arc;

/// Largest number of shader inputs in one sub-task.
pub const SHADER_SPLIT_SIZE: usize = 256;

/// Work a task does.
#[derive(Clone, Debug)]
pub enum TaskKind {
    /// Render every tile of a queue.
    PathTrace {
        /// Tiles to render.
        tiles: Arc<TileQueue>,
    },

    /// Convert a region of an accumulated render buffer to display pixels.
    FilmConvert {
        /// Render buffer.
        buffer: DevicePtr,

        /// Output RGBA bytes.
        rgba_byte: Option<DevicePtr>,

        /// Output RGBA half floats.
        rgba_half: Option<DevicePtr>,

        /// Index of the last sample taken.
        sample: u32,

        /// Region left pixel.
        x: usize,

        /// Region bottom pixel.
        y: usize,

        /// Region width.
        w: usize,

        /// Region height.
        h: usize,

        /// Buffer offset in pixels.
        offset: isize,

        /// Buffer row stride in pixels.
        stride: usize,
    },

    /// Evaluate shaders for a range of inputs.
    Shader {
        /// Inputs.
        input: Arc<Vec<ShaderInput>>,

        /// Output float4 per input.
        output: DevicePtr,

        /// Evaluation type.
        eval_type: ShaderEvalType,

        /// First input.
        shader_x: usize,

        /// Number of inputs.
        shader_w: usize,

        /// Samples per input.
        num_samples: u32,
    },
}

/// A task submitted to a device.
#[derive(Clone, Debug)]
pub struct DeviceTask {
    /// Work to do.
    pub kind: TaskKind,

    /// Progress and cancellation shared with the caller.
    pub progress: Arc<Progress>,

    /// Let tiles already acquired finish all their samples when the task is
    /// cancelled.
    pub need_finish_queue: bool,
}

impl DeviceTask {
    /// Create a task.
    ///
    /// * `kind`     - Work to do.
    /// * `progress` - Progress.
    pub fn new(kind: TaskKind, progress: Arc<Progress>) -> Self {
        Self {
            kind,
            progress,
            need_finish_queue: false,
        }
    }

    /// Split into sub-tasks for `num` workers. Path tracing gives every
    /// worker the same tile queue; film conversion splits rows; shader
    /// evaluation splits inputs into chunks of at most `SHADER_SPLIT_SIZE`.
    ///
    /// * `num` - Number of workers.
    pub fn split(&self, num: usize) -> Vec<DeviceTask> {
        let num = num.max(1);
        match &self.kind {
            TaskKind::PathTrace { .. } => vec![self.clone(); num],
            TaskKind::FilmConvert {
                buffer,
                rgba_byte,
                rgba_half,
                sample,
                x,
                y,
                w,
                h,
                offset,
                stride,
            } => split_range(*y, *h, num.min((*h).max(1)))
                .map(|(sy, sh)| {
                    self.with_kind(TaskKind::FilmConvert {
                        buffer: *buffer,
                        rgba_byte: *rgba_byte,
                        rgba_half: *rgba_half,
                        sample: *sample,
                        x: *x,
                        y: sy,
                        w: *w,
                        h: sh,
                        offset: *offset,
                        stride: *stride,
                    })
                })
                .collect(),
            TaskKind::Shader {
                input,
                output,
                eval_type,
                shader_x,
                shader_w,
                num_samples,
            } => {
                let num = num.max((*shader_w + SHADER_SPLIT_SIZE - 1) / SHADER_SPLIT_SIZE);
                split_range(*shader_x, *shader_w, num.min((*shader_w).max(1)))
                    .map(|(sx, sw)| {
                        self.with_kind(TaskKind::Shader {
                            input: input.clone(),
                            output: *output,
                            eval_type: *eval_type,
                            shader_x: sx,
                            shader_w: sw,
                            num_samples: *num_samples,
                        })
                    })
                    .collect()
            }
        }
    }

    fn with_kind(&self, kind: TaskKind) -> Self {
        Self {
            kind,
            progress: self.progress.clone(),
            need_finish_queue: self.need_finish_queue,
        }
    }
}

/// Split `[start, start + len)` into `parts` contiguous ranges whose
/// lengths differ by at most one.
fn split_range(start: usize, len: usize, parts: usize) -> impl Iterator<Item = (usize, usize)> {
    let parts = parts.max(1);
    (0..parts).map(move |i| {
        let begin = start + i * len / parts;
        let end = start + (i + 1) * len / parts;
        (begin, end - begin)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert_task(h: usize) -> DeviceTask {
        DeviceTask::new(
            TaskKind::FilmConvert {
                buffer: DevicePtr(1),
                rgba_byte: Some(DevicePtr(2)),
                rgba_half: None,
                sample: 3,
                x: 0,
                y: 2,
                w: 8,
                h,
                offset: 0,
                stride: 8,
            },
            Arc::new(Progress::new()),
        )
    }

    fn rows(tasks: &[DeviceTask]) -> Vec<(usize, usize)> {
        tasks
            .iter()
            .filter_map(|t| match t.kind {
                TaskKind::FilmConvert { y, h, .. } => Some((y, h)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn film_convert_splits_rows() {
        assert_eq!(rows(&convert_task(10).split(3)), vec![(2, 3), (5, 3), (8, 4)]);
        assert_eq!(rows(&convert_task(2).split(8)), vec![(2, 1), (3, 1)]);
    }

    #[test]
    fn shader_chunks_are_bounded() {
        let task = DeviceTask::new(
            TaskKind::Shader {
                input: Arc::new(vec![ShaderInput::default(); 1000]),
                output: DevicePtr(1),
                eval_type: ShaderEvalType::Background,
                shader_x: 0,
                shader_w: 1000,
                num_samples: 1,
            },
            Arc::new(Progress::new()),
        );
        let parts = task.split(2);
        assert_eq!(parts.len(), 4);
        let mut next = 0;
        for part in parts {
            if let TaskKind::Shader { shader_x, shader_w, .. } = part.kind {
                assert_eq!(shader_x, next);
                assert!(shader_w <= SHADER_SPLIT_SIZE);
                next += shader_w;
            }
        }
        assert_eq!(next, 1000);
    }

    proptest! {
        #[test]
        fn ranges_partition(start in 0usize..100, len in 0usize..500, parts in 1usize..32) {
            let ranges: Vec<_> = split_range(start, len, parts).collect();
            prop_assert_eq!(ranges.len(), parts);
            prop_assert_eq!(ranges.iter().map(|r| r.1).sum::<usize>(), len);
            for pair in ranges.windows(2) {
                prop_assert_eq!(pair[0].0 + pair[0].1, pair[1].0);
            }
        }
    }
}
