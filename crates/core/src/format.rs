use std::{fmt, num::NonZeroU32, str::FromStr};

/// Four-character code describing a pixel format.
///
/// # Example
/// ```rust
/// use meld_core::prelude::FourCc;
///
/// let fcc = FourCc::new(*b"UYVY");
/// assert_eq!(fcc.to_string(), "UYVY");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCc([u8; 4]);

impl FourCc {
    /// Construct from raw bytes.
    pub const fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Little-endian u32 encoding.
    pub fn to_u32(self) -> u32 {
        u32::from_le_bytes(self.0)
    }

    /// Try to convert to a printable string.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    /// Bytes per pixel for the packed single-plane formats the blender
    /// can size on its own. Unknown codes return `None` and require an
    /// explicit payload length.
    pub fn bytes_per_pixel(self) -> Option<usize> {
        if self == FourCc::new(*b"GREY") || self == FourCc::new(*b"R8  ") {
            Some(1)
        } else if self == FourCc::new(*b"UYVY") || self == FourCc::new(*b"YUYV") {
            Some(2)
        } else if self == FourCc::new(*b"RG24") || self == FourCc::new(*b"BGR3") {
            Some(3)
        } else if self == FourCc::new(*b"RGBA") || self == FourCc::new(*b"BGRA") {
            Some(4)
        } else {
            None
        }
    }
}

impl From<u32> for FourCc {
    fn from(value: u32) -> Self {
        Self(value.to_le_bytes())
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(s) = self.as_str() {
            write!(f, "{s}")
        } else {
            write!(f, "0x{:08x}", self.to_u32())
        }
    }
}

impl FromStr for FourCc {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != 4 {
            return Err("fourcc must be four ASCII bytes".into());
        }
        let mut arr = [0u8; 4];
        arr.copy_from_slice(bytes);
        Ok(FourCc(arr))
    }
}

/// Resolution of a frame.
///
/// # Example
/// ```rust
/// use meld_core::prelude::Resolution;
///
/// let res = Resolution::new(1920, 1080).unwrap();
/// assert_eq!(res.height.get(), 1080);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Resolution {
    /// Width in pixels (non-zero).
    pub width: NonZeroU32,
    /// Height in pixels (non-zero).
    pub height: NonZeroU32,
}

impl Resolution {
    /// Create a resolution, returning `None` if width or height are zero.
    pub fn new(width: u32, height: u32) -> Option<Self> {
        Some(Self {
            width: NonZeroU32::new(width)?,
            height: NonZeroU32::new(height)?,
        })
    }
}

/// Nominal frame rate expressed as an exact rational (seconds per frame).
///
/// # Example
/// ```rust
/// use meld_core::prelude::Interval;
///
/// let interval = Interval::from_fps(30);
/// assert_eq!(interval.fps(), 30.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Interval {
    /// Numerator of the seconds-per-frame rational.
    pub numerator: NonZeroU32,
    /// Denominator of the seconds-per-frame rational.
    pub denominator: NonZeroU32,
}

impl Interval {
    /// Interval for an integer frames-per-second rate (minimum 1 fps).
    pub fn from_fps(fps: u32) -> Self {
        Self {
            numerator: NonZeroU32::new(1).unwrap(),
            denominator: NonZeroU32::new(fps.max(1)).unwrap(),
        }
    }

    /// Frames per second as floating point.
    pub fn fps(&self) -> f32 {
        self.denominator.get() as f32 / self.numerator.get() as f32
    }
}

/// Interlacing mode of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Interlacing {
    /// Full progressive frames.
    Progressive,
    /// Separate fields, upper field first.
    UpperFieldFirst,
    /// Separate fields, lower field first.
    LowerFieldFirst,
    /// Both fields woven into one frame.
    InterlacedMerged,
    /// Progressive segmented frame (PsF).
    Segmented,
}

/// Full description of one decoded video buffer.
///
/// Two descriptors are equal iff every field matches exactly; the
/// engine relies on this to decide whether two frames can be blended
/// and whether the output sink needs reconfiguring.
///
/// # Example
/// ```rust
/// use meld_core::prelude::*;
///
/// let desc = VideoDesc::new(
///     FourCc::new(*b"UYVY"),
///     Resolution::new(1280, 720).unwrap(),
///     Interlacing::Progressive,
///     Interval::from_fps(25),
/// );
/// assert_eq!(desc.data_len(), Some(1280 * 720 * 2));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VideoDesc {
    /// Pixel format tag.
    pub code: FourCc,
    /// Frame geometry.
    pub resolution: Resolution,
    /// Interlacing mode.
    pub interlacing: Interlacing,
    /// Nominal frame rate.
    pub rate: Interval,
}

impl VideoDesc {
    /// Build a new descriptor.
    pub fn new(
        code: FourCc,
        resolution: Resolution,
        interlacing: Interlacing,
        rate: Interval,
    ) -> Self {
        Self {
            code,
            resolution,
            interlacing,
            rate,
        }
    }

    /// Packed single-plane payload size in bytes, when the format's
    /// pixel size is known.
    pub fn data_len(&self) -> Option<usize> {
        let bpp = self.code.bytes_per_pixel()?;
        Some(self.resolution.width.get() as usize * self.resolution.height.get() as usize * bpp)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for FourCc {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        // Prefer string encoding so decoding does not rely on `deserialize_any`.
        let encoded = self.as_str().unwrap_or("FFFF");
        serializer.serialize_str(encoded)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for FourCc {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct FourCcVisitor;

        impl<'de> serde::de::Visitor<'de> for FourCcVisitor {
            type Value = FourCc;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a 4-character FourCc string")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                FourCc::from_str(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_str(FourCcVisitor)
    }
}
