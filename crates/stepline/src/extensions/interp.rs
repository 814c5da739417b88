// extensions/interp.rs
//
// Render-side blending between the last two simulation states.
// The scheduler hands `on_render` an alpha; these helpers turn it into a position.

/// Linear blend between two values.
pub trait Lerp: Copy {
    fn lerp(self, to: Self, t: f64) -> Self;
}

impl Lerp for f32 {
    #[inline]
    fn lerp(self, to: Self, t: f64) -> Self {
        lerp(self, to, t as f32)
    }
}

impl Lerp for f64 {
    #[inline]
    fn lerp(self, to: Self, t: f64) -> Self {
        self + (to - self) * t
    }
}

#[cfg(feature = "interp")]
impl Lerp for glam::Vec2 {
    #[inline]
    fn lerp(self, to: Self, t: f64) -> Self {
        lerp_vec2(self, to, t as f32)
    }
}

/// Linearly interpolate between two floats.
#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Linearly interpolate between two Vec2 values.
#[cfg(feature = "interp")]
#[inline]
pub fn lerp_vec2(a: glam::Vec2, b: glam::Vec2, t: f32) -> glam::Vec2 {
    a + (b - a) * t
}

/// Previous and current simulation value of one quantity.
///
/// Call [`push`](Self::push) from `on_update` after each step and
/// [`get`](Self::get) from `on_render` with the alpha it receives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interpolated<T: Lerp> {
    previous: T,
    current: T,
}

impl<T: Lerp> Interpolated<T> {
    pub fn new(value: T) -> Self {
        Self {
            previous: value,
            current: value,
        }
    }

    /// Record the value produced by a new step.
    pub fn push(&mut self, value: T) {
        self.previous = self.current;
        self.current = value;
    }

    /// Jump to `value` without blending (teleports, respawns).
    pub fn snap(&mut self, value: T) {
        self.previous = value;
        self.current = value;
    }

    /// Value at `alpha` between the previous and the current step.
    pub fn get(&self, alpha: f64) -> T {
        self.previous.lerp(self.current, alpha.clamp(0.0, 1.0))
    }

    pub fn previous(&self) -> T {
        self.previous
    }

    pub fn current(&self) -> T {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lerp_endpoints() {
        assert_eq!(lerp(2.0, 6.0, 0.0), 2.0);
        assert_eq!(lerp(2.0, 6.0, 0.5), 4.0);
        assert_eq!(lerp(2.0, 6.0, 1.0), 6.0);
    }

    #[test]
    fn interpolated_blends_last_two_steps() {
        let mut x = Interpolated::new(0.0_f64);
        x.push(10.0);
        x.push(20.0);
        assert_eq!(x.previous(), 10.0);
        assert_eq!(x.get(0.25), 12.5);
        // alpha outside [0, 1] never extrapolates
        assert_eq!(x.get(3.0), 20.0);
    }

    #[test]
    fn snap_removes_blend() {
        let mut x = Interpolated::new(1.0_f32);
        x.push(5.0);
        x.snap(-3.0);
        assert_eq!(x.get(0.5), -3.0);
    }

    #[cfg(feature = "interp")]
    #[test]
    fn vec2_blends_componentwise() {
        use glam::Vec2;
        let mut p = Interpolated::new(Vec2::ZERO);
        p.push(Vec2::new(4.0, -8.0));
        assert_eq!(p.get(0.5), Vec2::new(2.0, -4.0));
    }
}
