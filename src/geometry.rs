use crate::util::*;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, new)]
pub struct Point {
    pub x: float,
    pub y: float,
}

impl Point {
    pub fn as_tuple(&self) -> Vector2 {
        (self.x, self.y)
    }

    pub fn distance_to(&self, other: &Point) -> float {
        norm2(self.as_tuple(), other.as_tuple())
    }

    pub fn manhattan_to(&self, other: &Point) -> float {
        norm1(self.as_tuple(), other.as_tuple())
    }
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq)]
pub struct Rect {
    pub xmin: float,
    pub ymin: float,
    pub xmax: float,
    pub ymax: float,
}

impl Rect {
    pub fn new(xmin: float, ymin: float, xmax: float, ymax: float) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    pub fn from_size(xmin: float, ymin: float, width: float, height: float) -> Self {
        Self {
            xmin,
            ymin,
            xmax: xmin + width,
            ymax: ymin + height,
        }
    }

    pub fn width(&self) -> float {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> float {
        self.ymax - self.ymin
    }

    pub fn area(&self) -> float {
        self.width() * self.height()
    }

    pub fn erosion(&self, delta: float) -> Self {
        Self {
            xmin: self.xmin + delta,
            ymin: self.ymin + delta,
            xmax: self.xmax - delta,
            ymax: self.ymax - delta,
        }
    }

    pub fn overlaps(&self, other: &Rect) -> bool {
        self.xmin < other.xmax
            && other.xmin < self.xmax
            && self.ymin < other.ymax
            && other.ymin < self.ymax
    }

    pub fn intersection_area(&self, other: &Rect) -> float {
        use geo::algorithm::bool_ops::BooleanOps;
        use geo::Area;
        let r1 = geo::Rect::new(
            geo::coord!(x: self.xmin, y: self.ymin),
            geo::coord!(x: self.xmax, y: self.ymax),
        );
        let r2 = geo::Rect::new(
            geo::coord!(x: other.xmin, y: other.ymin),
            geo::coord!(x: other.xmax, y: other.ymax),
        );
        r1.to_polygon()
            .intersection(&r2.to_polygon())
            .unsigned_area()
    }

    pub fn bbox(&self) -> [[float; 2]; 2] {
        [[self.xmin, self.ymin], [self.xmax, self.ymax]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_arithmetic() {
        let r = Rect::from_size(100.0, 200.0, 400.0, 200.0);
        assert_eq!(r.xmax, 500.0);
        assert_eq!(r.area(), 80_000.0);
        assert_eq!(r.erosion(10.0).width(), 380.0);
    }

    #[test]
    fn overlap_and_intersection_area() {
        let a = Rect::new(0.0, 0.0, 100.0, 100.0);
        let b = Rect::new(50.0, 50.0, 150.0, 150.0);
        let c = Rect::new(100.0, 0.0, 200.0, 100.0);
        assert!(a.overlaps(&b));
        // Touching edges do not overlap.
        assert!(!a.overlaps(&c));
        assert_eq!(a.intersection_area(&b), 2500.0);
    }

    #[test]
    fn point_distances() {
        let p = Point::new(0.0, 0.0);
        let q = Point::new(3.0, 4.0);
        assert_eq!(p.distance_to(&q), 5.0);
        assert_eq!(p.manhattan_to(&q), 7.0);
    }
}
