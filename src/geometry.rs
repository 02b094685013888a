/// 透视标定几何模块
/// 实现类似于 cv2::getPerspectiveTransform / perspectiveTransform 的功能
use anyhow::{anyhow, Result};

/// 透视变换矩阵 (3x3, 行优先)
/// | h0 h1 h2 |
/// | h3 h4 h5 |
/// | h6 h7 h8 |
#[derive(Debug, Clone, Copy)]
pub struct PerspectiveTransform {
    m: [f32; 9],
}

impl PerspectiveTransform {
    /// 由4对点求解单应矩阵
    ///
    /// source为像素坐标系中的四边形 (标定区域),
    /// target为路面坐标系中的矩形 (单位: 米)。
    /// 展开为8x8线性方程组, 高斯消元求解, h8固定为1。
    pub fn from_quads(source: &[(f32, f32); 4], target: &[(f32, f32); 4]) -> Result<Self> {
        // 每对点贡献两个方程:
        // x' = (h0*x + h1*y + h2) / (h6*x + h7*y + 1)
        // y' = (h3*x + h4*y + h5) / (h6*x + h7*y + 1)
        let mut a = [[0.0f64; 9]; 8];
        for (i, (&(x, y), &(u, v))) in source.iter().zip(target.iter()).enumerate() {
            let (x, y, u, v) = (x as f64, y as f64, u as f64, v as f64);
            a[2 * i] = [x, y, 1.0, 0.0, 0.0, 0.0, -u * x, -u * y, u];
            a[2 * i + 1] = [0.0, 0.0, 0.0, x, y, 1.0, -v * x, -v * y, v];
        }

        // 高斯消元 (部分主元)
        for col in 0..8 {
            let mut pivot = col;
            for row in (col + 1)..8 {
                if a[row][col].abs() > a[pivot][col].abs() {
                    pivot = row;
                }
            }
            if a[pivot][col].abs() < 1e-10 {
                return Err(anyhow!("degenerate calibration quadrilateral"));
            }
            a.swap(col, pivot);

            let div = a[col][col];
            for k in col..9 {
                a[col][k] /= div;
            }
            for row in 0..8 {
                if row != col {
                    let factor = a[row][col];
                    for k in col..9 {
                        a[row][k] -= factor * a[col][k];
                    }
                }
            }
        }

        let mut m = [0.0f32; 9];
        for i in 0..8 {
            m[i] = a[i][8] as f32;
        }
        m[8] = 1.0;
        Ok(Self { m })
    }

    /// 应用透视变换到点 (x, y), 含透视除法
    pub fn transform_point(&self, x: f32, y: f32) -> (f32, f32) {
        let w = self.m[6] * x + self.m[7] * y + self.m[8];
        // 标定区外的远点可能令w趋近0, 钳制避免除零
        let w = if w.abs() < 1e-8 { 1e-8 } else { w };
        let tx = (self.m[0] * x + self.m[1] * y + self.m[2]) / w;
        let ty = (self.m[3] * x + self.m[4] * y + self.m[5]) / w;
        (tx, ty)
    }

    /// 批量变换
    pub fn transform_points(&self, points: &[(f32, f32)]) -> Vec<(f32, f32)> {
        points
            .iter()
            .map(|&(x, y)| self.transform_point(x, y))
            .collect()
    }
}

/// 多边形监控区 (射线法判断点是否在区内)
#[derive(Debug, Clone)]
pub struct PolygonZone {
    vertices: Vec<(f32, f32)>,
}

impl PolygonZone {
    pub fn new(vertices: Vec<(f32, f32)>) -> Self {
        Self { vertices }
    }

    /// 判断点是否落在区内 (不足3个顶点时恒为false)
    pub fn contains(&self, x: f32, y: f32) -> bool {
        let n = self.vertices.len();
        if n < 3 {
            return false;
        }

        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (xi, yi) = self.vertices[i];
            let (xj, yj) = self.vertices[j];
            if ((yi > y) != (yj > y)) && (x < (xj - xi) * (y - yi) / (yj - yi) + xi) {
                inside = !inside;
            }
            j = i;
        }
        inside
    }

    pub fn vertices(&self) -> &[(f32, f32)] {
        &self.vertices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-2;

    #[test]
    fn test_identity_quad() {
        let quad = [(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)];
        let m = PerspectiveTransform::from_quads(&quad, &quad).unwrap();
        let (x, y) = m.transform_point(3.0, 7.0);
        assert!((x - 3.0).abs() < EPS);
        assert!((y - 7.0).abs() < EPS);
    }

    #[test]
    fn test_corners_map_to_corners() {
        // 高架相机标定: 梯形像素区域 → 25m x 250m 路面矩形
        let source = [
            (1252.0, 787.0),
            (2298.0, 803.0),
            (5039.0, 2159.0),
            (-550.0, 2159.0),
        ];
        let target = [(0.0, 0.0), (24.0, 0.0), (24.0, 249.0), (0.0, 249.0)];
        let m = PerspectiveTransform::from_quads(&source, &target).unwrap();

        for (src, tgt) in source.iter().zip(target.iter()) {
            let (x, y) = m.transform_point(src.0, src.1);
            assert!((x - tgt.0).abs() < 0.5, "x: {} vs {}", x, tgt.0);
            assert!((y - tgt.1).abs() < 0.5, "y: {} vs {}", y, tgt.1);
        }
    }

    #[test]
    fn test_degenerate_quad_rejected() {
        // 四点共线
        let source = [(0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (3.0, 0.0)];
        let target = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)];
        assert!(PerspectiveTransform::from_quads(&source, &target).is_err());
    }

    #[test]
    fn test_zone_contains() {
        let zone = PolygonZone::new(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]);
        assert!(zone.contains(5.0, 5.0));
        assert!(!zone.contains(15.0, 5.0));
        assert!(!zone.contains(-1.0, -1.0));
    }

    #[test]
    fn test_zone_concave() {
        // L形区域
        let zone = PolygonZone::new(vec![
            (0.0, 0.0),
            (10.0, 0.0),
            (10.0, 4.0),
            (4.0, 4.0),
            (4.0, 10.0),
            (0.0, 10.0),
        ]);
        assert!(zone.contains(2.0, 8.0));
        assert!(!zone.contains(8.0, 8.0));
    }

    #[test]
    fn test_zone_degenerate() {
        let zone = PolygonZone::new(vec![(0.0, 0.0), (10.0, 10.0)]);
        assert!(!zone.contains(5.0, 5.0));
    }
}
