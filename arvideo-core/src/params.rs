//! 参数键
//!
//! 键按类型划分为三个互不相交的命名空间 (int / double / string)。
//! 数值即旧接口中的整数键，`from_raw` 用于兼容边界。
//! 键的取值范围和含义由后端决定，并非每个后端都支持每个键。

macro_rules! param_keys {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident = $code:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(i32)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $code),+
        }

        impl $name {
            pub const fn raw(self) -> i32 {
                self as i32
            }

            pub fn from_raw(raw: i32) -> Option<Self> {
                match raw {
                    $($code => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

param_keys! {
    /// 整数参数
    IntParam {
        /// 库版本 (不需要打开设备即可查询)
        Version = 0,
        Width = 1,
        Height = 2,
        /// 像素格式编号，见 PixelFormat::code
        PixelFormat = 3,
        /// 0 = 第一个摄像头，1 = 第二个 ...
        CameraIndex = 4,
        /// 0 = 后置，1 = 前置
        CameraFace = 5,
        /// 标定查询是否允许访问网络 (0/1)
        InternetState = 6,
        Fps = 7,
        ExposureAbsolute = 8,
        Gain = 9,
        FocusAbsolute = 10,
        ZoomAbsolute = 11,
    }
}

param_keys! {
    /// 浮点参数
    DoubleParam {
        /// 镜头焦距 (米)
        FocalLength = 1,
    }
}

param_keys! {
    /// 字符串参数
    StringParam {
        /// 设备身份串 (manufacturer/model/board[/uid])
        DeviceId = 1,
        /// Image 后端当前帧对应的文件
        ImagePath = 2,
    }
}

/// 默认焦距估计值 (米)，后端未给出时使用
pub const FOCAL_LENGTH_DEFAULT: f64 = 0.0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_codes_round_trip() {
        for raw in 0..12 {
            let key = IntParam::from_raw(raw).unwrap();
            assert_eq!(key.raw(), raw);
        }
        assert_eq!(IntParam::from_raw(99), None);
        assert_eq!(DoubleParam::from_raw(1), Some(DoubleParam::FocalLength));
        assert_eq!(StringParam::from_raw(0), None);
    }
}
