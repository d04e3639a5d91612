use crate::frame::Line;
use serde::{Deserialize, Serialize};

/// Minimum share of a page that must be filled before a section boundary
/// is accepted as a break point.
pub const SMART_BREAK_MIN_FILL: f32 = 0.5;

/// Half-open range of line indices rendered on one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    pub start: usize,
    pub end: usize,
}

impl PageRange {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationStrategy {
    #[default]
    Fixed,
    Smart,
}

pub fn plan_pages(lines: &[Line], capacity: usize, strategy: PaginationStrategy) -> Vec<PageRange> {
    match strategy {
        PaginationStrategy::Fixed => chunk_fixed(lines.len(), capacity),
        PaginationStrategy::Smart => plan_smart_breaks(lines, capacity),
    }
}

fn clamp_capacity(capacity: usize) -> usize {
    if capacity == 0 {
        log::warn!("page capacity is zero, clamping to one line per page");
        return 1;
    }
    capacity
}

/// Splits `[0, total)` into consecutive pages of `capacity` lines.
pub fn chunk_fixed(total: usize, capacity: usize) -> Vec<PageRange> {
    let capacity = clamp_capacity(capacity);
    (0..total)
        .step_by(capacity)
        .map(|start| PageRange {
            start,
            end: (start + capacity).min(total),
        })
        .collect()
}

/// Indices `i >= 2` where a non-blank line follows at least two blank lines.
pub fn break_candidates(lines: &[Line]) -> Vec<usize> {
    (2..lines.len())
        .filter(|&i| !lines[i].is_blank() && lines[i - 1].is_blank() && lines[i - 2].is_blank())
        .collect()
}

/// Prefers breaking at section boundaries that keep each page at least
/// half full; falls back to a hard break at `capacity`.
pub fn plan_smart_breaks(lines: &[Line], capacity: usize) -> Vec<PageRange> {
    let capacity = clamp_capacity(capacity);
    let total = lines.len();
    let candidates = break_candidates(lines);
    let min_fill = (SMART_BREAK_MIN_FILL * capacity as f32).floor() as usize;

    let mut pages = Vec::new();
    let mut cursor = 0usize;
    while cursor < total {
        if total - cursor <= capacity {
            pages.push(PageRange {
                start: cursor,
                end: total,
            });
            break;
        }
        let window_start = cursor + min_fill;
        let window_end = cursor + capacity;
        let chosen = candidates
            .iter()
            .rev()
            .copied()
            .find(|&c| c > cursor && c >= window_start && c <= window_end);
        let end = chosen.unwrap_or(window_end);
        pages.push(PageRange { start: cursor, end });
        cursor = end;
    }
    pages
}
