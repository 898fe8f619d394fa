//! Render stage: one tick per presentation frame
//!
//! The surface itself (texture upload, swap-chain, window) lives outside
//! this crate behind [`VideoSurface`]; this stage owns the timing contract:
//! reconfigure on a dimension change *before* drawing the first frame at the
//! new size, always with an aspect-preserving viewport.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::constants::FRAME_WAIT;
use crate::error::MediaError;
use crate::media::swap::{FrameBuffer, FrameSwap};

/// Placement of the video inside the fixed output surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Letterbox/pillarbox `video` into `screen`, preserving aspect ratio and
/// centering the result.
pub fn fit_viewport(video_w: u32, video_h: u32, screen_w: u32, screen_h: u32) -> Viewport {
    let video_aspect = video_w as f64 / video_h as f64;
    let screen_aspect = screen_w as f64 / screen_h as f64;

    let (width, height) = if video_aspect < screen_aspect {
        // narrower than the screen: full height, pillarbox
        let height = screen_h;
        let width = (height as f64 * video_aspect) as u32;
        (width, height)
    } else {
        // wider than the screen: full width, letterbox
        let width = screen_w;
        let height = (width as f64 / video_aspect) as u32;
        (width, height)
    };

    Viewport {
        x: ((screen_w - width) / 2) as i32,
        y: ((screen_h - height) / 2) as i32,
        width,
        height,
    }
}

/// The presentation surface contract.
pub trait VideoSurface {
    /// Adapt texture allocation/viewport to new video dimensions. Called
    /// before the first `draw` at those dimensions.
    fn reconfigure(&mut self, width: u32, height: u32, viewport: Viewport)
        -> Result<(), MediaError>;

    /// Present one packed frame.
    fn draw(&mut self, frame: &FrameBuffer) -> Result<(), MediaError>;
}

pub struct RenderStage<S: VideoSurface> {
    swap: Arc<FrameSwap>,
    surface: S,
    screen_w: u32,
    screen_h: u32,
    applied_dims: Option<(u32, u32)>,
    frame_wait: Duration,
}

impl<S: VideoSurface> RenderStage<S> {
    pub fn new(swap: Arc<FrameSwap>, surface: S, screen_w: u32, screen_h: u32) -> Self {
        Self {
            swap,
            surface,
            screen_w,
            screen_h,
            applied_dims: None,
            frame_wait: FRAME_WAIT,
        }
    }

    /// Shorten/extend the per-tick frame wait (mainly for tests).
    pub fn with_frame_wait(mut self, frame_wait: Duration) -> Self {
        self.frame_wait = frame_wait;
        self
    }

    /// One presentation tick: wait (bounded) for a readable slot, resize the
    /// surface first if the frame's dimensions changed, then draw.
    ///
    /// `Ok(true)` when a frame was drawn, `Ok(false)` when none arrived in
    /// time; [`MediaError::ShutDown`] once the pipeline is torn down.
    pub fn tick(&mut self) -> Result<bool, MediaError> {
        let swap = self.swap.clone();
        let outcome = swap.consume(self.frame_wait, |frame| self.draw_frame(frame))?;
        match outcome {
            Some(result) => result.map(|_| true),
            None => Ok(false),
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    fn draw_frame(&mut self, frame: &FrameBuffer) -> Result<(), MediaError> {
        if frame.is_empty() {
            return Ok(());
        }

        let dims = (frame.width, frame.height);
        if self.applied_dims != Some(dims) {
            let viewport = fit_viewport(frame.width, frame.height, self.screen_w, self.screen_h);
            info!(
                width = frame.width,
                height = frame.height,
                ?viewport,
                "reconfiguring presentation surface"
            );
            self.surface.reconfigure(frame.width, frame.height, viewport)?;
            self.applied_dims = Some(dims);
        }

        self.surface.draw(frame)
    }
}
