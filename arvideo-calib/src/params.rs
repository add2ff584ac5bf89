use arvideo_core::error::{Result, VideoError};
use serde::{Deserialize, Serialize};

/// 畸变函数版本 4：[k1, k2, p1, p2, fx, fy, x0, y0, s]
pub const DIST_FUNCTION_VERSION_DEFAULT: u32 = 4;

/// 相机内参
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraParams {
    pub width: u32,
    pub height: u32,
    /// 3x4 投影矩阵
    pub projection: [[f64; 4]; 3],
    pub dist_factor: [f64; 9],
    pub dist_version: u32,
}

impl CameraParams {
    /// 由垂直视场角构造默认内参 (无畸变，主点位于图像中心)
    /// 没有任何标定数据时使用
    pub fn from_fov_y(width: u32, height: u32, fov_y: f64) -> Result<Self> {
        if width == 0 || height == 0 || !(fov_y > 0.0 && fov_y < std::f64::consts::PI) {
            return Err(VideoError::InvalidConfig(format!(
                "invalid size {}x{} or field of view {}",
                width, height, fov_y
            )));
        }
        let f = (height as f64 / 2.0) / (fov_y / 2.0).tan();
        let cx = width as f64 / 2.0;
        let cy = height as f64 / 2.0;
        Ok(Self {
            width,
            height,
            projection: [[f, 0.0, cx, 0.0], [0.0, f, cy, 0.0], [0.0, 0.0, 1.0, 0.0]],
            dist_factor: [0.0, 0.0, 0.0, 0.0, f, f, cx, cy, 1.0],
            dist_version: DIST_FUNCTION_VERSION_DEFAULT,
        })
    }

    pub fn fx(&self) -> f64 {
        self.projection[0][0]
    }

    pub fn fy(&self) -> f64 {
        self.projection[1][1]
    }

    pub fn principal_point(&self) -> (f64, f64) {
        (self.projection[0][2], self.projection[1][2])
    }

    /// 宽高比是否与目标尺寸一致 (允许 1 像素的取整误差)
    pub fn aspect_matches(&self, width: u32, height: u32) -> bool {
        // a/b == c/d  <=>  a*d == b*c
        let lhs = self.width as u64 * height as u64;
        let rhs = self.height as u64 * width as u64;
        lhs.abs_diff(rhs) <= (self.width.max(width)) as u64
    }

    /// 将内参缩放到新的分辨率
    pub fn change_size(&self, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(VideoError::InvalidConfig(format!(
                "cannot rescale camera parameters to {}x{}",
                width, height
            )));
        }
        let sx = width as f64 / self.width as f64;
        let sy = height as f64 / self.height as f64;

        let mut out = self.clone();
        out.width = width;
        out.height = height;
        for i in 0..4 {
            out.projection[0][i] *= sx;
            out.projection[1][i] *= sy;
        }
        if self.dist_version == DIST_FUNCTION_VERSION_DEFAULT {
            out.dist_factor[4] *= sx;
            out.dist_factor[5] *= sy;
            out.dist_factor[6] *= sx;
            out.dist_factor[7] *= sy;
        }
        Ok(out)
    }
}
