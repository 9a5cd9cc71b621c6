//! Retained-texture presentation backend.
//!
//! Owns exactly one cached frame at a time, as an egui-managed GPU texture:
//! [`handle_frame`](PresentationBackend::handle_frame) re-uploads the latest
//! decoded buffer, and [`draw_buffer`](PresentationBackend::draw_buffer)
//! repaints the textured quad into the layout rectangle on every tick. This
//! is the counterpart to the core's immediate [`SurfaceBackend`]: same
//! capability trait, opposite drawing discipline.
//!
//! [`SurfaceBackend`]: vidstim_core::backend::SurfaceBackend

use egui::{Color32, ColorImage, Context, Pos2, Rect, TextureHandle, TextureOptions};

use vidstim_core::backend::PresentationBackend;
use vidstim_core::input::InputEvent;
use vidstim_core::layout::ViewportLayout;
use vidstim_core::video::{PlaybackError, VideoFrame};

use crate::events::map_event;

/// egui retained-texture backend.
pub struct TextureBackend {
    ctx: Context,
    /// The cached frame; at most one exists at a time
    texture: Option<TextureHandle>,
    layout: Option<ViewportLayout>,
}

impl TextureBackend {
    /// Creates a backend painting into the given egui context.
    pub fn new(ctx: Context) -> Self {
        Self {
            ctx,
            texture: None,
            layout: None,
        }
    }

    /// Returns the cached frame texture, if a frame has been uploaded.
    pub fn texture(&self) -> Option<&TextureHandle> {
        self.texture.as_ref()
    }

    /// Converts a decoded frame to an egui image.
    ///
    /// Goes through `rgb_at` so stride padding and BGRA ordering are handled
    /// in one place.
    fn to_color_image(frame: &VideoFrame) -> ColorImage {
        let (width, height) = frame.dimensions();
        let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
        for y in 0..height {
            for x in 0..width {
                rgb.extend_from_slice(&frame.buffer.rgb_at(x, y));
            }
        }
        ColorImage::from_rgb([width as usize, height as usize], &rgb)
    }
}

impl PresentationBackend for TextureBackend {
    fn prepare_for_playback(&mut self, layout: &ViewportLayout) -> Result<(), PlaybackError> {
        self.layout = Some(*layout);
        Ok(())
    }

    fn handle_frame(&mut self, frame: &VideoFrame) {
        let image = Self::to_color_image(frame);
        match &mut self.texture {
            Some(texture) => texture.set(image, TextureOptions::LINEAR),
            None => {
                self.texture =
                    Some(self.ctx
                        .load_texture("vidstim-frame", image, TextureOptions::LINEAR));
            }
        }
    }

    fn draw_buffer(&mut self) {
        let (Some(texture), Some(layout)) = (&self.texture, self.layout) else {
            return;
        };
        let painter = self.ctx.layer_painter(egui::LayerId::new(
            egui::Order::Background,
            egui::Id::new("vidstim-video"),
        ));
        let rect = Rect::from_min_size(
            Pos2::new(layout.offset.0 as f32, layout.offset.1 as f32),
            egui::vec2(layout.dest.0 as f32, layout.dest.1 as f32),
        );
        let uv = Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0));
        painter.image(texture.id(), rect, uv, Color32::WHITE);
    }

    fn pump_events(&mut self) {
        // Keep the host window's event loop turning between frames
        self.ctx.request_repaint();
    }

    fn poll_input(&mut self) -> Vec<InputEvent> {
        self.ctx
            .input(|input| input.events.iter().filter_map(map_event).collect())
    }

    fn playback_finished(&mut self) {
        // Release the cached frame; the texture itself is freed by egui
        if self.texture.take().is_some() {
            tracing::debug!("Released retained frame texture");
        }
        self.layout = None;
    }
}
