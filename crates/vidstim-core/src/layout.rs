//! Viewport layout: where decoded frames land on the output surface.
//!
//! The layout is computed once after preroll, from the negotiated source
//! size and the screen size, and never changes during playback.

/// Destination geometry for presenting frames.
///
/// In fit-to-screen mode the source is scaled to the largest size that fits
/// the screen without distorting the aspect ratio; otherwise the native
/// source size is used. Either way the result is centered, so the offset can
/// be negative when the source is larger than the screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportLayout {
    /// Intrinsic source size (width, height)
    pub source: (u32, u32),
    /// Output surface size (width, height)
    pub screen: (u32, u32),
    /// Destination size after scaling (width, height)
    pub dest: (u32, u32),
    /// Top-left corner of the destination rectangle, centered on the screen
    pub offset: (i32, i32),
}

impl ViewportLayout {
    /// Computes the layout for a source on a screen.
    pub fn compute(screen: (u32, u32), source: (u32, u32), fit_to_screen: bool) -> Self {
        let dest = if fit_to_screen {
            scaled_resolution(screen, source)
        } else {
            source
        };
        let offset = (
            (screen.0 as i32 - dest.0 as i32) / 2,
            (screen.1 as i32 - dest.1 as i32) / 2,
        );
        Self {
            source,
            screen,
            dest,
            offset,
        }
    }
}

/// Calculates the largest size for `source` that fits `screen` while
/// preserving the source aspect ratio.
///
/// If the screen is wider than the source (`rs > ri`) the image is fit to
/// the screen height, otherwise to the screen width.
pub fn scaled_resolution(screen: (u32, u32), source: (u32, u32)) -> (u32, u32) {
    let (ws, hs) = screen;
    let (wi, hi) = source;
    if ws == 0 || hs == 0 || wi == 0 || hi == 0 {
        return (0, 0);
    }

    let rs = ws as f64 / hs as f64;
    let ri = wi as f64 / hi as f64;

    if rs > ri {
        ((wi as u64 * hs as u64 / hi as u64) as u32, hs)
    } else {
        (ws, (hi as u64 * ws as u64 / wi as u64) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fullscreen_fit_1080p_on_800x600() {
        let layout = ViewportLayout::compute((800, 600), (1920, 1080), true);
        assert_eq!(layout.dest, (800, 450));
        assert_eq!(layout.offset, (0, 75));
    }

    #[test]
    fn test_fit_to_height_when_screen_wider() {
        // 4:3 source on a 16:9 screen: pillarboxed, full height
        let layout = ViewportLayout::compute((1920, 1080), (640, 480), true);
        assert_eq!(layout.dest, (1440, 1080));
        assert_eq!(layout.offset, (240, 0));
    }

    #[test]
    fn test_native_size_is_centered() {
        let layout = ViewportLayout::compute((800, 600), (400, 300), false);
        assert_eq!(layout.dest, (400, 300));
        assert_eq!(layout.offset, (200, 150));
    }

    #[test]
    fn test_native_size_larger_than_screen_goes_negative() {
        let layout = ViewportLayout::compute((800, 600), (1920, 1080), false);
        assert_eq!(layout.dest, (1920, 1080));
        assert_eq!(layout.offset, (-560, -240));
    }

    #[test]
    fn test_scaled_resolution_preserves_aspect_and_fits() {
        let cases = [
            ((800u32, 600u32), (1920u32, 1080u32)),
            ((1920, 1080), (1920, 1080)),
            ((1280, 1024), (720, 576)),
            ((640, 480), (1080, 1920)),
            ((3840, 2160), (640, 360)),
            ((1366, 768), (853, 480)),
        ];
        for (screen, source) in cases {
            let (dw, dh) = scaled_resolution(screen, source);
            assert!(dw <= screen.0 && dh <= screen.1, "{source:?} on {screen:?}");

            let src_ratio = source.0 as f64 / source.1 as f64;
            let dst_ratio = dw as f64 / dh as f64;
            // Integer truncation bounds the ratio error by one pixel on the
            // scaled axis.
            let tolerance = 1.0 / dh as f64 + 1.0 / dw as f64;
            assert!(
                (src_ratio - dst_ratio).abs() <= src_ratio * tolerance,
                "aspect drift for {source:?} on {screen:?}: {src_ratio} vs {dst_ratio}"
            );
        }
    }

    #[test]
    fn test_centering_within_rounding() {
        let cases = [
            ((800u32, 600u32), (1920u32, 1080u32)),
            ((1921, 1081), (640, 481)),
            ((1280, 720), (720, 576)),
        ];
        for (screen, source) in cases {
            let layout = ViewportLayout::compute(screen, source, true);
            let cx = layout.offset.0 + layout.dest.0 as i32 / 2;
            let cy = layout.offset.1 + layout.dest.1 as i32 / 2;
            assert!((cx - screen.0 as i32 / 2).abs() <= 1);
            assert!((cy - screen.1 as i32 / 2).abs() <= 1);
        }
    }

    #[test]
    fn test_degenerate_sizes_do_not_panic() {
        assert_eq!(scaled_resolution((0, 0), (1920, 1080)), (0, 0));
        assert_eq!(scaled_resolution((800, 600), (0, 0)), (0, 0));
    }
}
