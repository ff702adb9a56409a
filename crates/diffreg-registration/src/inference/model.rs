//! The diffusion model seam and the trajectory it produces.

use burn::tensor::backend::Backend;
use ndarray::{Array3, Array4, Axis};

use super::dataset::Sample;
use crate::error::{RegistrationError, Result};

/// Host copy of one reverse-diffusion step.
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryFrame {
    /// Moving volume warped by this step's flow, `[D, H, W]`.
    pub deform: Array3<f32>,
    /// Denoiser score for this step, `[D, H, W]`. Diagnostics only.
    pub code: Array3<f32>,
    /// Displacement in voxels, `[3, D, H, W]` with channels (d, h, w).
    pub flow: Array4<f32>,
}

impl TrajectoryFrame {
    /// Spatial shape `[D, H, W]`.
    pub fn shape(&self) -> [usize; 3] {
        let (d, h, w) = self.deform.dim();
        [d, h, w]
    }

    fn check(&self) -> Result<()> {
        let shape = self.shape();
        let (cd, ch, cw) = self.code.dim();
        let (c, fd, fh, fw) = self.flow.dim();
        if [cd, ch, cw] != shape || [fd, fh, fw] != shape || c != 3 {
            return Err(RegistrationError::model(format!(
                "inconsistent trajectory frame: deform {:?}, code {:?}, flow {:?}",
                shape,
                [cd, ch, cw],
                [c, fd, fh, fw]
            )));
        }
        Ok(())
    }
}

/// Ordered reverse-diffusion frames. Index 0 is the initial state and the
/// last frame is the converged result.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    frames: Vec<TrajectoryFrame>,
}

impl Trajectory {
    /// Build a trajectory from at least one frame of consistent shape.
    pub fn new(frames: Vec<TrajectoryFrame>) -> Result<Self> {
        let first = frames
            .first()
            .ok_or_else(|| RegistrationError::model("trajectory has no frames"))?;
        let shape = first.shape();
        for frame in &frames {
            frame.check()?;
            if frame.shape() != shape {
                return Err(RegistrationError::model(format!(
                    "trajectory frame shape {:?} differs from {:?}",
                    frame.shape(),
                    shape
                )));
            }
        }
        Ok(Self { frames })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[TrajectoryFrame] {
        &self.frames
    }

    pub fn initial(&self) -> &TrajectoryFrame {
        &self.frames[0]
    }

    pub fn final_frame(&self) -> &TrajectoryFrame {
        &self.frames[self.frames.len() - 1]
    }

    /// Frames produced by denoising steps, without the initial state.
    pub fn refined_frames(&self) -> &[TrajectoryFrame] {
        &self.frames[1..]
    }

    /// Spatial shape `[D, H, W]`.
    pub fn shape(&self) -> [usize; 3] {
        self.initial().shape()
    }

    /// Refined deform frames stacked on a trailing axis, `[D, H, W, T]`.
    pub fn deform_stack(&self) -> Array4<f32> {
        stack_last(self.refined_frames().iter().map(|f| &f.deform), self.shape())
    }

    /// Refined code frames stacked on a trailing axis, `[D, H, W, T]`.
    pub fn code_stack(&self) -> Array4<f32> {
        stack_last(self.refined_frames().iter().map(|f| &f.code), self.shape())
    }
}

fn stack_last<'a>(
    frames: impl ExactSizeIterator<Item = &'a Array3<f32>>,
    [d, h, w]: [usize; 3],
) -> Array4<f32> {
    let mut stacked = Array4::<f32>::zeros((d, h, w, frames.len()));
    for (t, frame) in frames.enumerate() {
        stacked.index_axis_mut(Axis(3), t).assign(frame);
    }
    stacked
}

/// Reverse-diffusion registration model used at inference time.
pub trait DiffusionModel<B: Backend> {
    /// Load one moving/fixed pair into the model's working state.
    fn feed(&mut self, sample: &Sample<B>) -> Result<()>;

    /// Run the reverse-diffusion loop on the fed pair.
    ///
    /// With `return_all_steps` every step is retained; otherwise only the
    /// initial and final frames are.
    fn infer(&mut self, return_all_steps: bool) -> Result<()>;

    /// Trajectory of the last [`DiffusionModel::infer`] call.
    fn current_outputs(&self) -> Result<Trajectory>;
}
