//! Polygon helpers for detection post-processing and cropping
//!
//! Hulls, rectangle fitting and areas come from `imageproc::geometry`; these
//! cover the float-coordinate pieces it does not provide.

use super::Point;

fn sub(a: Point, b: Point) -> Point {
    (a.0 - b.0, a.1 - b.1)
}

pub fn distance(a: Point, b: Point) -> f32 {
    let (dx, dy) = sub(a, b);
    (dx * dx + dy * dy).sqrt()
}

/// Shorter side of a rectangle given by consecutive corners
pub fn short_side(rect: &[Point; 4]) -> f32 {
    distance(rect[0], rect[1]).min(distance(rect[1], rect[2]))
}

/// Push every side of a rectangle outward by `delta`
pub fn expand_rect(rect: &[Point; 4], delta: f32) -> [Point; 4] {
    let unit = |a: Point, b: Point| {
        let d = sub(b, a);
        let len = (d.0 * d.0 + d.1 * d.1).sqrt().max(f32::EPSILON);
        (d.0 / len, d.1 / len)
    };
    let u = unit(rect[0], rect[1]);
    let v = unit(rect[0], rect[3]);
    let shift = |p: Point, su: f32, sv: f32| {
        (
            p.0 + delta * (su * u.0 + sv * v.0),
            p.1 + delta * (su * u.1 + sv * v.1),
        )
    };

    [
        shift(rect[0], -1.0, -1.0),
        shift(rect[1], 1.0, -1.0),
        shift(rect[2], 1.0, 1.0),
        shift(rect[3], -1.0, 1.0),
    ]
}

/// Even-odd point-in-polygon test
pub fn contains_point(polygon: &[Point], p: Point) -> bool {
    let n = polygon.len();
    let mut inside = false;
    let mut j = n.wrapping_sub(1);
    for i in 0..n {
        let (pi, pj) = (polygon[i], polygon[j]);
        if (pi.1 > p.1) != (pj.1 > p.1) {
            let x = (pj.0 - pi.0) * (p.1 - pi.1) / (pj.1 - pi.1) + pi.0;
            if p.0 < x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}
