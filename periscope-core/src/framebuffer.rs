//! Accumulating pixel store shared between the receive loop and the
//! consumer.
//!
//! The receive path writes decoded rectangles with [`FramebufferStore::commit`]
//! and is the only path allowed to reallocate storage; the consumer
//! drains accumulated changes with [`FramebufferStore::take_damage`].
//! The drain critical section copies four integers and clones an `Arc`
//! — pixel copying never happens under the store lock.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::AlphaPolicy;

/// Lock a mutex, recovering the data from a poisoned lock.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── DamageRect ───────────────────────────────────────────────────

/// The bounding box of all pixels changed since the last drain.
///
/// The empty rectangle uses an inverted sentinel (`left > right`) so
/// that unioning is a plain min/max, mirroring how the damage union is
/// seeded before any commit arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DamageRect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl DamageRect {
    /// The empty rectangle.
    pub const EMPTY: Self = Self {
        left: u32::MAX,
        top: u32::MAX,
        right: 0,
        bottom: 0,
    };

    /// Build from an origin and extent.
    pub fn from_rect(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            left: x,
            top: y,
            right: x + width,
            bottom: y + height,
        }
    }

    /// Whether this rectangle covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }

    /// Extend to cover `other` as well.
    pub fn union_with(&mut self, other: DamageRect) {
        if other.is_empty() {
            return;
        }
        self.left = self.left.min(other.left);
        self.top = self.top.min(other.top);
        self.right = self.right.max(other.right);
        self.bottom = self.bottom.max(other.bottom);
    }

    /// Horizontal extent; zero when empty.
    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    /// Vertical extent; zero when empty.
    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }
}

impl Default for DamageRect {
    fn default() -> Self {
        Self::EMPTY
    }
}

// ── FrameView ────────────────────────────────────────────────────

/// Shared reference-counted handle to pixel storage.
type SharedPixels = Arc<Mutex<Vec<u32>>>;

/// A read-only view of the framebuffer returned by a drain.
///
/// The view stays self-consistent for the geometry it was taken with,
/// but callers must not retain it past their next
/// [`FramebufferStore::take_damage`] call: a geometry change swaps the
/// storage out from under older views.
#[derive(Debug, Clone)]
pub struct FrameView {
    pixels: SharedPixels,
    width: u32,
    height: u32,
}

impl FrameView {
    /// A zero-sized view, returned before any geometry is known.
    pub fn empty() -> Self {
        Self {
            pixels: Arc::new(Mutex::new(Vec::new())),
            width: 0,
            height: 0,
        }
    }

    /// Frame width in pixels (row stride equals width).
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Lock the pixel storage for reading. Row-major, packed 4-byte
    /// samples, one `u32` per pixel.
    pub fn pixels(&self) -> MutexGuard<'_, Vec<u32>> {
        lock(&self.pixels)
    }
}

// ── FramebufferStore ─────────────────────────────────────────────

struct StoreState {
    width: u32,
    height: u32,
    damage: DamageRect,
    pixels: SharedPixels,
}

/// The shared framebuffer plus its pending-damage union.
pub struct FramebufferStore {
    state: Mutex<StoreState>,
    fill: u32,
}

impl FramebufferStore {
    /// Create an empty store; geometry arrives with the first resize.
    pub fn new(alpha: AlphaPolicy) -> Self {
        Self {
            state: Mutex::new(StoreState {
                width: 0,
                height: 0,
                damage: DamageRect::EMPTY,
                pixels: Arc::new(Mutex::new(Vec::new())),
            }),
            fill: alpha.fill_value(),
        }
    }

    /// Current geometry as `(width, height)`.
    pub fn geometry(&self) -> (u32, u32) {
        let state = lock(&self.state);
        (state.width, state.height)
    }

    /// Reallocate storage for a new geometry.
    ///
    /// Swaps in fresh storage (outstanding views keep the old buffer),
    /// and marks the entire new frame damaged, atomically with the
    /// geometry change. Only the receive path may call this.
    pub fn resize(&self, width: u32, height: u32) {
        let fresh = Arc::new(Mutex::new(vec![
            self.fill;
            width as usize * height as usize
        ]));
        let mut state = lock(&self.state);
        state.width = width;
        state.height = height;
        state.pixels = fresh;
        state.damage = DamageRect::from_rect(0, 0, width, height);
    }

    /// Write a decoded rectangle and extend the damage union.
    ///
    /// `data` is row-major with stride `width`. The rectangle is
    /// clipped to the buffer bounds; nothing is ever written out of
    /// range. O(area), no allocation. Called only from the receive
    /// path, so storage cannot be swapped mid-commit.
    pub fn commit(&self, x: u32, y: u32, width: u32, height: u32, data: &[u32]) {
        if data.len() < width as usize * height as usize {
            return;
        }
        let (pixels, fb_width, fb_height) = {
            let state = lock(&self.state);
            (state.pixels.clone(), state.width, state.height)
        };
        let clip_w = width.min(fb_width.saturating_sub(x)) as usize;
        let clip_h = height.min(fb_height.saturating_sub(y)) as usize;
        if clip_w == 0 || clip_h == 0 {
            return;
        }

        {
            let mut px = lock(&pixels);
            for row in 0..clip_h {
                let src = row * width as usize;
                let dst = (y as usize + row) * fb_width as usize + x as usize;
                px[dst..dst + clip_w].copy_from_slice(&data[src..src + clip_w]);
            }
        }

        // Damage becomes visible only after the pixels are in place.
        let mut state = lock(&self.state);
        state
            .damage
            .union_with(DamageRect::from_rect(x, y, clip_w as u32, clip_h as u32));
    }

    /// Copy a region within the buffer (CopyRect semantics).
    ///
    /// The source region is snapshotted first, so overlapping source
    /// and destination behave as a simultaneous move.
    pub fn copy_rect(&self, src_x: u32, src_y: u32, dst_x: u32, dst_y: u32, width: u32, height: u32) {
        let (pixels, fb_width, fb_height) = {
            let state = lock(&self.state);
            (state.pixels.clone(), state.width, state.height)
        };
        let clip_w = width
            .min(fb_width.saturating_sub(src_x))
            .min(fb_width.saturating_sub(dst_x)) as usize;
        let clip_h = height
            .min(fb_height.saturating_sub(src_y))
            .min(fb_height.saturating_sub(dst_y)) as usize;
        if clip_w == 0 || clip_h == 0 {
            return;
        }

        let snapshot: Vec<u32> = {
            let px = lock(&pixels);
            let mut out = Vec::with_capacity(clip_w * clip_h);
            for row in 0..clip_h {
                let src = (src_y as usize + row) * fb_width as usize + src_x as usize;
                out.extend_from_slice(&px[src..src + clip_w]);
            }
            out
        };
        self.commit(dst_x, dst_y, clip_w as u32, clip_h as u32, &snapshot);
    }

    /// Atomically read-and-clear the damage union and return a view of
    /// the current buffer.
    ///
    /// An empty rectangle means no new pixels since the last drain.
    /// Callable from any thread.
    pub fn take_damage(&self) -> (DamageRect, FrameView) {
        let mut state = lock(&self.state);
        let damage = std::mem::replace(&mut state.damage, DamageRect::EMPTY);
        let view = FrameView {
            pixels: state.pixels.clone(),
            width: state.width,
            height: state.height,
        };
        (damage, view)
    }
}

// ── Tests ────────────────────────────────────────────────────────
