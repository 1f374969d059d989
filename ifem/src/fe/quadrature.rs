use crate::mesh::Point;

/// Quadrature rule on the reference cell `[0,1]^dim`.
#[derive(Clone, Debug, PartialEq)]
pub struct Quadrature {
    points: Vec<Point>,
    weights: Vec<f64>,
}

/// Gauss-Legendre abscissae and weights on `[0,1]`.
fn gauss_1d(n: usize) -> (Vec<f64>, Vec<f64>) {
    match n {
        1 => (vec![0.5], vec![1.0]),
        2 => {
            let a = 0.5 / 3.0_f64.sqrt();
            (vec![0.5 - a, 0.5 + a], vec![0.5, 0.5])
        }
        _ => {
            let a = 0.5 * (0.6_f64).sqrt();
            (
                vec![0.5 - a, 0.5, 0.5 + a],
                vec![5.0 / 18.0, 8.0 / 18.0, 5.0 / 18.0],
            )
        }
    }
}

impl Quadrature {
    /// Tensor product Gauss rule with `n` points per direction (at most 3).
    ///
    /// Points are numbered with the first coordinate running fastest.
    pub fn gauss(dim: usize, n: usize) -> Self {
        let (x, w) = gauss_1d(n.clamp(1, 3));
        let n = x.len();
        let total = n.pow(dim as u32);
        let mut points = Vec::with_capacity(total);
        let mut weights = Vec::with_capacity(total);
        for k in 0..total {
            let mut p = Point::zeros(dim);
            let mut weight = 1.0;
            let mut rem = k;
            for d in 0..dim {
                p[d] = x[rem % n];
                weight *= w[rem % n];
                rem /= n;
            }
            points.push(p);
            weights.push(weight);
        }
        Quadrature { points, weights }
    }

    /// A collection of points with unit weights, used to evaluate mappings at support points.
    pub fn from_points(points: Vec<Point>) -> Self {
        let weights = vec![1.0; points.len()];
        Quadrature { points, weights }
    }

    /// Embeds a `dim - 1` dimensional rule onto face `face` of the `dim` dimensional
    /// reference cell.
    pub fn on_face(face_rule: &Quadrature, dim: usize, face: usize) -> Self {
        let axis = face / 2;
        let side = (face % 2) as f64;
        let points = face_rule
            .points
            .iter()
            .map(|fp| {
                let mut p = Point::zeros(dim);
                let mut k = 0;
                for d in 0..dim {
                    if d == axis {
                        p[d] = side;
                    } else {
                        p[d] = fp[k];
                        k += 1;
                    }
                }
                p
            })
            .collect();
        Quadrature {
            points,
            weights: face_rule.weights.clone(),
        }
    }

    pub fn size(&self) -> usize {
        self.points.len()
    }

    pub fn point(&self, q: usize) -> &Point {
        &self.points[q]
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn weight(&self, q: usize) -> f64 {
        self.weights[q]
    }
}
