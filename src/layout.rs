//! Info-panel template and the geometry around it.
//!
//! The screen is laid out as `PAD_LEFT` spaces, the animation column,
//! `GAP` spaces, then the info lines. The template holds the info side
//! only; the animation is painted over the reserved column every frame.

use std::sync::Arc;

use crate::text::truncate_line;

pub const PAD_LEFT: usize = 4;
pub const GAP: usize = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Padding {
    pub top: usize,
    pub bottom: usize,
}

impl Padding {
    /// Split `diff` blank rows: half on top, the rest (half plus the odd
    /// row) on the bottom.
    pub fn split(diff: usize) -> Self {
        let pad = diff / 2;
        Self {
            top: pad,
            bottom: pad + diff % 2,
        }
    }
}

/// Padding for the shorter of the two columns. Only one side is ever padded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Centering {
    pub animation: Padding,
    pub info: Padding,
}

pub fn centering(anim_height: usize, info_height: usize, enabled: bool) -> Centering {
    if !enabled || anim_height == info_height {
        return Centering::default();
    }
    if info_height < anim_height {
        Centering {
            animation: Padding::default(),
            info: Padding::split(anim_height - info_height),
        }
    } else {
        Centering {
            animation: Padding::split(info_height - anim_height),
            info: Padding::default(),
        }
    }
}

/// Animation height matching the source aspect ratio at `width` columns.
pub fn infer_height(width: u32, source_width: u32, source_height: u32) -> u32 {
    if source_width == 0 {
        return width.max(1);
    }
    let height = (f64::from(width) * f64::from(source_height) / f64::from(source_width)).round();
    (height as u32).max(1)
}

/// Prefix every info line with the left margin, the animation column and
/// the gap.
pub fn build_template(info_lines: &[String], left_margin: usize, gap: usize, anim_width: usize) -> Vec<String> {
    let prefix = " ".repeat(left_margin + anim_width + gap);
    info_lines
        .iter()
        .map(|line| format!("{prefix}{line}"))
        .collect()
}

/// Immutable snapshot of the info panel. Cloning shares the lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    lines: Arc<[String]>,
    anim_row_offset: usize,
}

impl Template {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Rows between the top of the template and the first animation row.
    pub fn anim_row_offset(&self) -> usize {
        self.anim_row_offset
    }

    /// Every line cut to `terminal_width` columns.
    pub fn fit(&self, terminal_width: usize) -> Vec<String> {
        self.lines
            .iter()
            .map(|line| truncate_line(line, terminal_width.max(1)))
            .collect()
    }
}

/// Fixed geometry of one playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutPlan {
    pub left: usize,
    pub gap: usize,
    pub anim_width: usize,
    pub anim_height: usize,
    pub center: bool,
}

impl LayoutPlan {
    pub fn new(anim_width: usize, anim_height: usize, center: bool) -> Self {
        Self {
            left: PAD_LEFT,
            gap: GAP,
            anim_width,
            anim_height,
            center,
        }
    }

    /// Build the template for `info_lines`, centered against the animation
    /// when requested. With centering on, the template is blank-filled to
    /// at least the animation height.
    pub fn template(&self, info_lines: &[String]) -> Template {
        let centering = centering(self.anim_height, info_lines.len(), self.center);
        let blank = " ".repeat(self.left + self.anim_width + self.gap);

        let mut lines = Vec::with_capacity(
            info_lines.len() + centering.info.top + centering.info.bottom,
        );
        lines.extend(std::iter::repeat(blank.clone()).take(centering.info.top));
        lines.extend(build_template(info_lines, self.left, self.gap, self.anim_width));
        lines.extend(std::iter::repeat(blank.clone()).take(centering.info.bottom));
        if self.center && lines.len() < self.anim_height {
            let missing = self.anim_height - lines.len();
            lines.extend(std::iter::repeat(blank).take(missing));
        }

        Template {
            lines: lines.into(),
            anim_row_offset: centering.animation.top,
        }
    }
}
