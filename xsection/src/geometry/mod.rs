//! Planar geometry primitives used to describe section lines and features.

pub mod section_line;
pub use section_line::{
    azimuth_deviation, build_section_line, cumulative_station, Eligibility, SectionLine,
    SectionLineRecord, StackedLine,
};

/// Representation of a 2D point in map coordinates.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<Point> for geo_types::Coord<f64> {
    fn from(p: Point) -> Self {
        geo_types::coord! { x: p.x, y: p.y }
    }
}

impl From<geo_types::Coord<f64>> for Point {
    fn from(c: geo_types::Coord<f64>) -> Self {
        Point::new(c.x, c.y)
    }
}

/// Calculates the Euclidean distance between two points.
pub fn distance(a: Point, b: Point) -> f64 {
    ((b.x - a.x).powi(2) + (b.y - a.y).powi(2)).sqrt()
}

/// A straight segment between two consecutive section vertices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start: Point,
    pub end: Point,
}

impl Segment {
    pub fn new(start: Point, end: Point) -> Self {
        Self { start, end }
    }

    /// Returns the length of the segment.
    pub fn length(&self) -> f64 {
        distance(self.start, self.end)
    }

    /// Returns the azimuth from the start point to the end point in radians,
    /// measured counter-clockwise from the positive X (east) axis.
    pub fn azimuth(&self) -> f64 {
        (self.end.y - self.start.y).atan2(self.end.x - self.start.x)
    }

    /// Unit direction vector, or `(0, 0)` for a zero-length segment.
    pub fn direction(&self) -> (f64, f64) {
        let len = self.length();
        if len == 0.0 {
            (0.0, 0.0)
        } else {
            ((self.end.x - self.start.x) / len, (self.end.y - self.start.y) / len)
        }
    }

    /// Absolute angle in degrees between this segment and the nearer of due
    /// east or due west. Always within `0..=90`.
    pub fn east_west_deviation(&self) -> f64 {
        let az = self.azimuth().to_degrees().abs();
        az.min(180.0 - az)
    }

    /// Parameter `t` in `0..=1` of the point on the segment closest to `p`.
    pub fn closest_parameter(&self, p: Point) -> f64 {
        let dx = self.end.x - self.start.x;
        let dy = self.end.y - self.start.y;
        let len2 = dx * dx + dy * dy;
        if len2 == 0.0 {
            return 0.0;
        }
        (((p.x - self.start.x) * dx + (p.y - self.start.y) * dy) / len2).clamp(0.0, 1.0)
    }

    /// Point at parameter `t` along the segment.
    pub fn point_at(&self, t: f64) -> Point {
        Point::new(
            self.start.x + t * (self.end.x - self.start.x),
            self.start.y + t * (self.end.y - self.start.y),
        )
    }

    /// True when the two closed segments share at least one point.
    pub fn intersects(&self, other: &Segment) -> bool {
        let d1 = orient(other.start, other.end, self.start);
        let d2 = orient(other.start, other.end, self.end);
        let d3 = orient(self.start, self.end, other.start);
        let d4 = orient(self.start, self.end, other.end);
        if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
            && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
        {
            return true;
        }
        (d1 == 0.0 && on_segment(other, self.start))
            || (d2 == 0.0 && on_segment(other, self.end))
            || (d3 == 0.0 && on_segment(self, other.start))
            || (d4 == 0.0 && on_segment(self, other.end))
    }
}

fn orient(a: Point, b: Point, c: Point) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

fn on_segment(seg: &Segment, p: Point) -> bool {
    p.x >= seg.start.x.min(seg.end.x)
        && p.x <= seg.start.x.max(seg.end.x)
        && p.y >= seg.start.y.min(seg.end.y)
        && p.y <= seg.start.y.max(seg.end.y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_length_and_azimuth() {
        let seg = Segment::new(Point::new(0.0, 0.0), Point::new(3.0, 4.0));
        assert_eq!(seg.length(), 5.0);
        assert!((seg.azimuth() - (4.0f64).atan2(3.0)).abs() < 1e-6);
    }

    #[test]
    fn east_west_deviation_both_directions() {
        let east = Segment::new(Point::new(0.0, 0.0), Point::new(10.0, 0.0));
        let west = Segment::new(Point::new(10.0, 0.0), Point::new(0.0, 0.0));
        let diag = Segment::new(Point::new(0.0, 0.0), Point::new(70.0, 70.0));
        let north = Segment::new(Point::new(0.0, 0.0), Point::new(0.0, 5.0));
        assert!(east.east_west_deviation().abs() < 1e-9);
        assert!(west.east_west_deviation().abs() < 1e-9);
        assert!((diag.east_west_deviation() - 45.0).abs() < 1e-9);
        assert!((north.east_west_deviation() - 90.0).abs() < 1e-9);
    }

    #[test]
    fn closest_parameter_clamps_to_ends() {
        let seg = Segment::new(Point::new(0.0, 0.0), Point::new(2.0, 0.0));
        assert_eq!(seg.point_at(seg.closest_parameter(Point::new(1.0, 2.0))), Point::new(1.0, 0.0));
        assert_eq!(seg.closest_parameter(Point::new(-5.0, 1.0)), 0.0);
        assert_eq!(seg.closest_parameter(Point::new(9.0, -1.0)), 1.0);
    }

    #[test]
    fn crossing_and_touching_segments() {
        let a = Segment::new(Point::new(0.0, 0.0), Point::new(2.0, 2.0));
        let b = Segment::new(Point::new(0.0, 2.0), Point::new(2.0, 0.0));
        let c = Segment::new(Point::new(3.0, 0.0), Point::new(4.0, 0.0));
        let d = Segment::new(Point::new(2.0, 2.0), Point::new(3.0, 5.0));
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert!(a.intersects(&d));
    }

    #[test]
    fn geo_types_coord_conversion() {
        let c: geo_types::Coord<f64> = Point::new(1.5, -2.0).into();
        assert_eq!(c.x, 1.5);
        assert_eq!(Point::from(c), Point::new(1.5, -2.0));
    }
}
