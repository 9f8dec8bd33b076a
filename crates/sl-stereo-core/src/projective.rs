//! 3×4 projective model relating a disparity-augmented pixel `(x, y, d)` of
//! one view to the projector code `(u, v)` it sees.
//!
//! Fitted with a Hartley-normalized DLT; the model is defined up to scale and
//! stored with unit Frobenius norm.

use nalgebra::{Matrix3, Matrix4, SMatrix, SVector, Vector3, Vector4};
use serde::{Deserialize, Serialize};

/// One observation: pixel `(x, y)` with disparity `d` decodes to code `(u, v)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CodeCorrespondence {
    pub x: f64,
    pub y: f64,
    pub d: f64,
    pub u: f64,
    pub v: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectiveModel {
    pub p: SMatrix<f64, 3, 4>,
}

/// Minimum number of correspondences the DLT needs (11 DoF, 2 equations each).
pub const MIN_CORRESPONDENCES: usize = 6;

impl ProjectiveModel {
    pub fn new(p: SMatrix<f64, 3, 4>) -> Self {
        Self { p }
    }

    pub fn from_rows(rows: [[f64; 4]; 3]) -> Self {
        Self {
            p: SMatrix::<f64, 3, 4>::from_fn(|r, c| rows[r][c]),
        }
    }

    pub fn to_rows(&self) -> [[f64; 4]; 3] {
        let mut rows = [[0.0; 4]; 3];
        for (r, row) in rows.iter_mut().enumerate() {
            for (c, v) in row.iter_mut().enumerate() {
                *v = self.p[(r, c)];
            }
        }
        rows
    }

    /// Code predicted for `(x, y, d)`, `None` at the plane at infinity.
    #[inline]
    pub fn project(&self, x: f64, y: f64, d: f64) -> Option<(f64, f64)> {
        let h = self.p * Vector4::new(x, y, d, 1.0);
        if h[2].abs() < 1e-12 {
            return None;
        }
        Some((h[0] / h[2], h[1] / h[2]))
    }

    /// Euclidean distance between the predicted and observed code.
    pub fn residual(&self, c: &CodeCorrespondence) -> Option<f64> {
        let (pu, pv) = self.project(c.x, c.y, c.d)?;
        Some(((pu - c.u).powi(2) + (pv - c.v).powi(2)).sqrt())
    }

    /// Least-squares disparity that makes pixel `(x, y)` project to `(u, v)`.
    ///
    /// Each code axis gives one linear equation `a·d = b`; `None` when the
    /// disparity column is degenerate for this pixel.
    pub fn solve_disparity(&self, x: f64, y: f64, u: f64, v: f64) -> Option<f64> {
        let base = self.p * Vector4::new(x, y, 0.0, 1.0);
        let col: Vector3<f64> = self.p.column(2).into_owned();
        let mut num = 0.0;
        let mut den = 0.0;
        for (axis, obs) in [(0usize, u), (1usize, v)] {
            let a = obs * col[2] - col[axis];
            let b = base[axis] - obs * base[2];
            num += a * b;
            den += a * a;
        }
        if den < 1e-18 {
            return None;
        }
        let d = num / den;
        d.is_finite().then_some(d)
    }

    /// Fit the model to at least [`MIN_CORRESPONDENCES`] observations.
    pub fn fit(points: &[CodeCorrespondence]) -> Option<Self> {
        if points.len() < MIN_CORRESPONDENCES {
            return None;
        }
        let t_src = normalization3(points)?;
        let t_dst = normalization2(points)?;

        // accumulate AᵀA instead of the 2N×12 design matrix
        let mut ata = SMatrix::<f64, 12, 12>::zeros();
        for c in points {
            let xn = t_src * Vector4::new(c.x, c.y, c.d, 1.0);
            let un = t_dst * Vector3::new(c.u, c.v, 1.0);
            let (u, v) = (un[0], un[1]);

            // [ -X  0  u·X ]
            let mut r0 = SVector::<f64, 12>::zeros();
            // [ 0  -X  v·X ]
            let mut r1 = SVector::<f64, 12>::zeros();
            for k in 0..4 {
                r0[k] = -xn[k];
                r0[8 + k] = u * xn[k];
                r1[4 + k] = -xn[k];
                r1[8 + k] = v * xn[k];
            }
            ata += r0 * r0.transpose();
            ata += r1 * r1.transpose();
        }

        let eig = ata.symmetric_eigen();
        let (min_idx, _) = eig
            .eigenvalues
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))?;
        let h = eig.eigenvectors.column(min_idx);
        let pn = SMatrix::<f64, 3, 4>::from_row_iterator(h.iter().copied());

        let p = t_dst.try_inverse()? * pn * t_src;
        let norm = p.norm();
        if !(norm > 1e-12) || !norm.is_finite() {
            return None;
        }
        let mut p = p / norm;
        // fix the sign so repeated fits compare equal
        if p[(2, 3)] < 0.0 || (p[(2, 3)] == 0.0 && p.sum() < 0.0) {
            p = -p;
        }
        Some(Self { p })
    }

    /// Fit, then refit once on the observations within `inlier_threshold`.
    pub fn fit_robust(points: &[CodeCorrespondence], inlier_threshold: f64) -> Option<Self> {
        let first = Self::fit(points)?;
        let inliers: Vec<CodeCorrespondence> = points
            .iter()
            .filter(|c| first.residual(c).is_some_and(|r| r <= inlier_threshold))
            .copied()
            .collect();
        if inliers.len() == points.len() || inliers.len() < MIN_CORRESPONDENCES {
            return Some(first);
        }
        Self::fit(&inliers).or(Some(first))
    }
}

fn normalization3(points: &[CodeCorrespondence]) -> Option<Matrix4<f64>> {
    let n = points.len() as f64;
    let (mut cx, mut cy, mut cd) = (0.0, 0.0, 0.0);
    for c in points {
        cx += c.x;
        cy += c.y;
        cd += c.d;
    }
    cx /= n;
    cy /= n;
    cd /= n;

    let mut mean_dist = 0.0;
    for c in points {
        mean_dist += ((c.x - cx).powi(2) + (c.y - cy).powi(2) + (c.d - cd).powi(2)).sqrt();
    }
    mean_dist /= n;
    if !mean_dist.is_finite() {
        return None;
    }
    let s = if mean_dist > 1e-12 {
        3.0_f64.sqrt() / mean_dist
    } else {
        1.0
    };
    Some(Matrix4::new(
        s, 0.0, 0.0, -s * cx, //
        0.0, s, 0.0, -s * cy, //
        0.0, 0.0, s, -s * cd, //
        0.0, 0.0, 0.0, 1.0,
    ))
}

fn normalization2(points: &[CodeCorrespondence]) -> Option<Matrix3<f64>> {
    let n = points.len() as f64;
    let (mut cu, mut cv) = (0.0, 0.0);
    for c in points {
        cu += c.u;
        cv += c.v;
    }
    cu /= n;
    cv /= n;

    let mut mean_dist = 0.0;
    for c in points {
        mean_dist += ((c.u - cu).powi(2) + (c.v - cv).powi(2)).sqrt();
    }
    mean_dist /= n;
    if !mean_dist.is_finite() {
        return None;
    }
    let s = if mean_dist > 1e-12 {
        2.0_f64.sqrt() / mean_dist
    } else {
        1.0
    };
    Some(Matrix3::new(s, 0.0, -s * cu, 0.0, s, -s * cv, 0.0, 0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn synthetic(model: &ProjectiveModel) -> Vec<CodeCorrespondence> {
        let mut pts = Vec::new();
        for y in 0..12 {
            for x in 0..30 {
                let d = -8.0 + (x / 10) as f64 + (y % 3) as f64 * 0.5;
                let (u, v) = model.project(x as f64, y as f64, d).unwrap();
                pts.push(CodeCorrespondence {
                    x: x as f64,
                    y: y as f64,
                    d,
                    u,
                    v,
                });
            }
        }
        pts
    }

    fn reference() -> ProjectiveModel {
        ProjectiveModel::new(SMatrix::<f64, 3, 4>::from_row_slice(&[
            1.0, 0.02, 1.0, 5.0, //
            0.01, 1.0, 0.1, -3.0, //
            0.0005, 0.0002, 0.001, 1.0,
        ]))
    }

    #[test]
    fn fit_recovers_exact_model_up_to_scale() {
        let truth = reference();
        let pts = synthetic(&truth);
        let fitted = ProjectiveModel::fit(&pts).expect("fit");
        for c in &pts {
            assert!(fitted.residual(c).unwrap() < 1e-6);
        }
        let (u, v) = fitted.project(7.0, 3.0, -6.5).unwrap();
        let (tu, tv) = truth.project(7.0, 3.0, -6.5).unwrap();
        assert_relative_eq!(u, tu, epsilon = 1e-6);
        assert_relative_eq!(v, tv, epsilon = 1e-6);
    }

    #[test]
    fn solve_disparity_inverts_projection() {
        let truth = reference();
        let (u, v) = truth.project(10.0, 4.0, -7.25).unwrap();
        let d = truth.solve_disparity(10.0, 4.0, u, v).unwrap();
        assert_relative_eq!(d, -7.25, epsilon = 1e-9);
    }

    #[test]
    fn robust_fit_ignores_gross_outliers() {
        let truth = reference();
        let mut pts = synthetic(&truth);
        for c in pts.iter_mut().step_by(37) {
            c.u += 40.0;
        }
        let fitted = ProjectiveModel::fit_robust(&pts, 10.0).expect("fit");
        let (u, _) = fitted.project(12.0, 6.0, -7.0).unwrap();
        let (tu, _) = truth.project(12.0, 6.0, -7.0).unwrap();
        assert!((u - tu).abs() < 1e-3);
    }

    #[test]
    fn too_few_points_is_none() {
        let pts = synthetic(&reference());
        assert!(ProjectiveModel::fit(&pts[..5]).is_none());
    }
}
