//! Delaunay triangulation (Bowyer-Watson) with barycentric linear interpolation.

use rstar::primitives::{GeomWithData, Rectangle};
use rstar::RTree;
use std::collections::HashMap;

/// Tolerance for the barycentric inside test, turn tests and circumcircle test.
const EPSILON: f64 = 1e-9;

/// Distance of the super-triangle vertices from the input, in multiples of its span.
const SUPER_TRIANGLE_SCALE: f64 = 1000.0;

type TriangleEnvelope = GeomWithData<Rectangle<[f64; 2]>, usize>;

#[derive(Debug, Clone, Copy)]
struct Triangle {
    vertices: [usize; 3],
    center: [f64; 2],
    radius_2: f64,
}

impl Triangle {
    /// `None` only for exactly collinear vertices, which bound no area.
    fn new(vertices: [usize; 3], points: &[[f64; 2]]) -> Option<Self> {
        let [a, b, c] = vertices.map(|v| points[v]);
        let d = 2.0 * (a[0] * (b[1] - c[1]) + b[0] * (c[1] - a[1]) + c[0] * (a[1] - b[1]));
        if d == 0.0 {
            return None;
        }
        let a2 = a[0] * a[0] + a[1] * a[1];
        let b2 = b[0] * b[0] + b[1] * b[1];
        let c2 = c[0] * c[0] + c[1] * c[1];
        let center = [
            (a2 * (b[1] - c[1]) + b2 * (c[1] - a[1]) + c2 * (a[1] - b[1])) / d,
            (a2 * (c[0] - b[0]) + b2 * (a[0] - c[0]) + c2 * (b[0] - a[0])) / d,
        ];
        Some(Self {
            vertices,
            center,
            radius_2: distance_2(center, a),
        })
    }

    fn circumcircle_contains(&self, point: [f64; 2]) -> bool {
        distance_2(self.center, point) < self.radius_2 * (1.0 - EPSILON)
    }

    fn edges(&self) -> [(usize, usize); 3] {
        let [a, b, c] = self.vertices;
        [(a, b), (b, c), (c, a)]
    }
}

fn distance_2(a: [f64; 2], b: [f64; 2]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    dx * dx + dy * dy
}

fn same_edge(a: (usize, usize), b: (usize, usize)) -> bool {
    (a.0 == b.0 && a.1 == b.1) || (a.0 == b.1 && a.1 == b.0)
}

/// Twice the signed area of `abc`; positive when counter-clockwise.
fn orient(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> f64 {
    (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0])
}

fn counter_clockwise(vertices: [usize; 3], points: &[[f64; 2]]) -> [usize; 3] {
    let [a, b, c] = vertices;
    if orient(points[a], points[b], points[c]) < 0.0 {
        [a, c, b]
    } else {
        vertices
    }
}

/// Edges used by exactly one triangle, oriented with the triangulated area on their left.
fn boundary_edges(triangles: &[[usize; 3]]) -> Vec<(usize, usize)> {
    let edges = |t: &[usize; 3]| [(t[0], t[1]), (t[1], t[2]), (t[2], t[0])];
    let mut uses: HashMap<(usize, usize), u32> = HashMap::new();
    for triangle in triangles {
        for (a, b) in edges(triangle) {
            *uses.entry((a.min(b), a.max(b))).or_default() += 1;
        }
    }
    triangles
        .iter()
        .flat_map(edges)
        .filter(|&(a, b)| uses.get(&(a.min(b), a.max(b))) == Some(&1))
        .collect()
}

/// Closes concave pockets left along the boundary until it is convex.
///
/// A boundary vertex `b` with a right turn `a -> b -> c` gets the triangle
/// `(a, c, b)` if no other point lies in it. Only vertices with a single
/// outgoing boundary edge are considered, so the new triangle cannot overlap
/// an existing one.
fn fill_concavities(points: &[[f64; 2]], triangles: &mut Vec<[usize; 3]>) {
    loop {
        let boundary = boundary_edges(triangles);
        let mut outgoing: HashMap<usize, Vec<usize>> = HashMap::new();
        for &(a, b) in &boundary {
            outgoing.entry(a).or_default().push(b);
        }

        let ear = boundary.iter().find_map(|&(a, b)| {
            let [c] = outgoing.get(&b)?.as_slice() else {
                return None;
            };
            let c = *c;
            if c == a || orient(points[a], points[b], points[c]) > -EPSILON {
                return None;
            }
            let (pa, pb, pc) = (points[a], points[b], points[c]);
            let blocked = points.iter().enumerate().any(|(i, &p)| {
                i != a
                    && i != b
                    && i != c
                    && orient(pa, pc, p) >= -EPSILON
                    && orient(pc, pb, p) >= -EPSILON
                    && orient(pb, pa, p) >= -EPSILON
            });
            (!blocked).then_some([a, c, b])
        });

        match ear {
            Some(triangle) => triangles.push(triangle),
            None => break,
        }
    }
}

/// A Delaunay triangulation of distinct planar points.
#[derive(Debug, Clone)]
pub struct Triangulation {
    points: Vec<[f64; 2]>,
    triangles: Vec<[usize; 3]>,
    index: RTree<TriangleEnvelope>,
}

impl Triangulation {
    /// Triangulates `points`, which must be distinct.
    ///
    /// Returns `None` when no triangle can be formed: fewer than three points
    /// or all points on one line.
    pub fn new(points: &[[f64; 2]]) -> Option<Self> {
        if points.len() < 3 {
            return None;
        }

        let n = points.len();
        let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
        let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for p in points {
            min_x = min_x.min(p[0]);
            min_y = min_y.min(p[1]);
            max_x = max_x.max(p[0]);
            max_y = max_y.max(p[1]);
        }
        let span = (max_x - min_x).max(max_y - min_y).max(1.0);
        let mid = [(min_x + max_x) / 2.0, (min_y + max_y) / 2.0];

        // Working set: the input points followed by a super-triangle enclosing them all.
        let mut all = points.to_vec();
        let reach = SUPER_TRIANGLE_SCALE * span;
        all.push([mid[0] - reach, mid[1] - reach]);
        all.push([mid[0], mid[1] + reach]);
        all.push([mid[0] + reach, mid[1] - reach]);

        let mut triangles = vec![Triangle::new([n, n + 1, n + 2], &all)?];

        for i in 0..n {
            let point = all[i];
            let (bad, good): (Vec<Triangle>, Vec<Triangle>) = triangles
                .into_iter()
                .partition(|t| t.circumcircle_contains(point));
            triangles = good;

            let mut boundary: Vec<(usize, usize)> = Vec::new();
            for (t_index, triangle) in bad.iter().enumerate() {
                for edge in triangle.edges() {
                    let shared = bad
                        .iter()
                        .enumerate()
                        .any(|(o_index, other)| {
                            o_index != t_index && other.edges().iter().any(|e| same_edge(*e, edge))
                        });
                    if !shared {
                        boundary.push(edge);
                    }
                }
            }

            // Only exactly collinear fans are skipped; they cover no area.
            triangles.extend(
                boundary
                    .into_iter()
                    .filter_map(|(a, b)| Triangle::new([a, b, i], &all)),
            );
        }

        let mut triangles: Vec<[usize; 3]> = triangles
            .into_iter()
            .filter(|t| t.vertices.iter().all(|v| *v < n))
            .map(|t| counter_clockwise(t.vertices, points))
            .collect();
        if triangles.is_empty() {
            return None;
        }
        // Dropping the super-triangle can leave slivers of the convex hull uncovered.
        fill_concavities(points, &mut triangles);

        let envelopes = triangles
            .iter()
            .enumerate()
            .map(|(index, vertices)| {
                let [a, b, c] = vertices.map(|v| points[v]);
                let lower = [a[0].min(b[0]).min(c[0]), a[1].min(b[1]).min(c[1])];
                let upper = [a[0].max(b[0]).max(c[0]), a[1].max(b[1]).max(c[1])];
                GeomWithData::new(Rectangle::from_corners(lower, upper), index)
            })
            .collect();

        Some(Self {
            points: points.to_vec(),
            triangles,
            index: RTree::bulk_load(envelopes),
        })
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Linearly interpolates `values` (one per input point) at `at`.
    ///
    /// Returns `None` outside the convex hull.
    pub fn interpolate(&self, values: &[f64], at: [f64; 2]) -> Option<f64> {
        self.index.locate_all_at_point(&at).find_map(|candidate| {
            let vertices = self.triangles[candidate.data];
            let [a, b, c] = vertices.map(|v| self.points[v]);
            let weights = barycentric(a, b, c, at)?;
            Some(
                weights[0] * values[vertices[0]]
                    + weights[1] * values[vertices[1]]
                    + weights[2] * values[vertices[2]],
            )
        })
    }
}

/// Barycentric weights of `p` in triangle `abc`, if `p` lies inside it.
fn barycentric(a: [f64; 2], b: [f64; 2], c: [f64; 2], p: [f64; 2]) -> Option<[f64; 3]> {
    let det = (b[1] - c[1]) * (a[0] - c[0]) + (c[0] - b[0]) * (a[1] - c[1]);
    if det.abs() < EPSILON * EPSILON {
        return None;
    }
    let l1 = ((b[1] - c[1]) * (p[0] - c[0]) + (c[0] - b[0]) * (p[1] - c[1])) / det;
    let l2 = ((c[1] - a[1]) * (p[0] - c[0]) + (a[0] - c[0]) * (p[1] - c[1])) / det;
    let l3 = 1.0 - l1 - l2;
    (l1 >= -EPSILON && l2 >= -EPSILON && l3 >= -EPSILON).then_some([l1, l2, l3])
}
