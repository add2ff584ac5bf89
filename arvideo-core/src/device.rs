use std::fmt;

/// 后端类型标识
/// 判别值即旧接口的设备编号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[repr(i32)]
pub enum DeviceType {
    Dummy = 0,
    LinuxV4L = 1,
    LinuxDV = 2,
    Linux1394Cam = 3,
    Sgi = 4,
    WinDS = 5,
    WinDSVL = 6,
    WinDF = 7,
    QuickTime = 8,
    GStreamer = 9,
    IPhone = 10,
    QuickTime7 = 11,
    Image = 12,
    Android = 13,
    WinMF = 14,
    WinMC = 15,
    LinuxV4L2 = 16,
}

impl DeviceType {
    pub const ALL: [DeviceType; 17] = [
        Self::Dummy,
        Self::LinuxV4L,
        Self::LinuxDV,
        Self::Linux1394Cam,
        Self::Sgi,
        Self::WinDS,
        Self::WinDSVL,
        Self::WinDF,
        Self::QuickTime,
        Self::GStreamer,
        Self::IPhone,
        Self::QuickTime7,
        Self::Image,
        Self::Android,
        Self::WinMF,
        Self::WinMC,
        Self::LinuxV4L2,
    ];

    /// `-device=<Name>` 中使用的名字 (区分大小写)
    pub const fn name(self) -> &'static str {
        match self {
            Self::Dummy => "Dummy",
            Self::LinuxV4L => "LinuxV4L",
            Self::LinuxDV => "LinuxDV",
            Self::Linux1394Cam => "Linux1394Cam",
            Self::Sgi => "SGI",
            Self::WinDS => "WinDS",
            Self::WinDSVL => "WinDSVL",
            Self::WinDF => "WinDF",
            Self::QuickTime => "QUICKTIME",
            Self::GStreamer => "GStreamer",
            Self::IPhone => "iPhone",
            Self::QuickTime7 => "QuickTime7",
            Self::Image => "Image",
            Self::Android => "Android",
            Self::WinMF => "WinMF",
            Self::WinMC => "WinMC",
            Self::LinuxV4L2 => "LinuxV4L2",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|d| d.name() == name)
    }

    /// 识别单个配置 token，例如 "-device=Dummy"
    pub fn from_token(token: &str) -> Option<Self> {
        token.strip_prefix("-device=").and_then(Self::from_name)
    }

    pub const fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|d| d.code() == code)
    }

    /// 编译期默认设备
    /// 没有显式 `-device=` 且没有环境变量时使用
    pub fn compile_time_default() -> Self {
        cfg_if::cfg_if! {
            if #[cfg(all(target_os = "linux", feature = "default-v4l2"))] {
                Self::LinuxV4L2
            } else if #[cfg(feature = "default-image")] {
                Self::Image
            } else {
                Self::Dummy
            }
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
