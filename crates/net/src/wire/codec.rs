use glam::{Quat, Vec3, Vec4};

use super::packet::PacketReader;

/// Scale applied to low-resolution floats before truncation to `i16`.
pub const LOW_RES_SCALE: f32 = 10.0;
pub const LOW_RES_MAX: f32 = i16::MAX as f32 / LOW_RES_SCALE;
/// Scale applied to small floats (clamped to `[-1, 1]`) before truncation to `i8`.
pub const SMALL_SCALE: f32 = 127.0;

const NONE_SENTINEL: u8 = u8::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("buffer underrun: needed {needed} bytes, {remaining} remaining")]
    BufferUnderrun { needed: usize, remaining: usize },
}

pub trait WireEncode {
    fn encode(&self, out: &mut Vec<u8>);
}

pub trait WireDecode: Sized {
    fn decode(reader: &mut PacketReader<'_>) -> Result<Self, WireError>;
}

impl<T: WireEncode + ?Sized> WireEncode for &T {
    fn encode(&self, out: &mut Vec<u8>) {
        (**self).encode(out);
    }
}

macro_rules! fixed_width {
    ($($ty:ty),*) => {
        $(
            impl WireEncode for $ty {
                fn encode(&self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }
            }

            impl WireDecode for $ty {
                fn decode(reader: &mut PacketReader<'_>) -> Result<Self, WireError> {
                    let bytes = reader.take(std::mem::size_of::<$ty>())?;
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    Ok(<$ty>::from_le_bytes(raw))
                }
            }
        )*
    };
}

fixed_width!(u8, u16, u32, i16);

impl WireEncode for bool {
    fn encode(&self, out: &mut Vec<u8>) {
        out.push(u8::from(*self));
    }
}

impl WireDecode for bool {
    fn decode(reader: &mut PacketReader<'_>) -> Result<Self, WireError> {
        Ok(u8::decode(reader)? != 0)
    }
}

/// Optional ids travel as a single byte with 255 meaning "none".
impl WireEncode for Option<u8> {
    fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.unwrap_or(NONE_SENTINEL));
    }
}

impl WireDecode for Option<u8> {
    fn decode(reader: &mut PacketReader<'_>) -> Result<Self, WireError> {
        let value = u8::decode(reader)?;
        Ok((value != NONE_SENTINEL).then_some(value))
    }
}

impl WireEncode for str {
    fn encode(&self, out: &mut Vec<u8>) {
        let bytes = self.as_bytes();
        let len = bytes.len().min(u16::MAX as usize);
        (len as u16).encode(out);
        out.extend_from_slice(&bytes[..len]);
    }
}

impl WireEncode for String {
    fn encode(&self, out: &mut Vec<u8>) {
        self.as_str().encode(out);
    }
}

impl WireDecode for String {
    fn decode(reader: &mut PacketReader<'_>) -> Result<Self, WireError> {
        let len = u16::decode(reader)? as usize;
        let bytes = reader.take(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Length-prefixed opaque bytes.
impl WireEncode for [u8] {
    fn encode(&self, out: &mut Vec<u8>) {
        let len = self.len().min(u16::MAX as usize);
        (len as u16).encode(out);
        out.extend_from_slice(&self[..len]);
    }
}

impl WireEncode for Vec<u8> {
    fn encode(&self, out: &mut Vec<u8>) {
        self.as_slice().encode(out);
    }
}

impl WireDecode for Vec<u8> {
    fn decode(reader: &mut PacketReader<'_>) -> Result<Self, WireError> {
        let len = u16::decode(reader)? as usize;
        Ok(reader.take(len)?.to_vec())
    }
}

/// Full double precision: authoritative positions and timestamps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HighRes(pub f64);

/// Single precision: velocities and rotations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Standard(pub f32);

/// Tenth-of-a-unit precision in an `i16`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LowRes(pub f32);

/// Unit-range value in an `i8`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Small(pub f32);

impl WireEncode for HighRes {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.0.to_le_bytes());
    }
}

impl WireDecode for HighRes {
    fn decode(reader: &mut PacketReader<'_>) -> Result<Self, WireError> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(reader.take(8)?);
        Ok(Self(f64::from_le_bytes(raw)))
    }
}

impl WireEncode for Standard {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.0.to_le_bytes());
    }
}

impl WireDecode for Standard {
    fn decode(reader: &mut PacketReader<'_>) -> Result<Self, WireError> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(reader.take(4)?);
        Ok(Self(f32::from_le_bytes(raw)))
    }
}

impl WireEncode for LowRes {
    fn encode(&self, out: &mut Vec<u8>) {
        let quantized = (self.0.clamp(-LOW_RES_MAX, LOW_RES_MAX) * LOW_RES_SCALE).round() as i16;
        quantized.encode(out);
    }
}

impl WireDecode for LowRes {
    fn decode(reader: &mut PacketReader<'_>) -> Result<Self, WireError> {
        Ok(Self(i16::decode(reader)? as f32 / LOW_RES_SCALE))
    }
}

impl WireEncode for Small {
    fn encode(&self, out: &mut Vec<u8>) {
        let quantized = (self.0.clamp(-1.0, 1.0) * SMALL_SCALE).round() as i8;
        out.push(quantized as u8);
    }
}

impl WireDecode for Small {
    fn decode(reader: &mut PacketReader<'_>) -> Result<Self, WireError> {
        Ok(Self(u8::decode(reader)? as i8 as f32 / SMALL_SCALE))
    }
}

macro_rules! tiered_vec3 {
    ($name:ident, $tier:ident, $to:expr, $from:expr) => {
        #[derive(Debug, Clone, Copy, PartialEq)]
        pub struct $name(pub Vec3);

        impl WireEncode for $name {
            fn encode(&self, out: &mut Vec<u8>) {
                for component in self.0.to_array() {
                    $tier($to(component)).encode(out);
                }
            }
        }

        impl WireDecode for $name {
            fn decode(reader: &mut PacketReader<'_>) -> Result<Self, WireError> {
                let x = $tier::decode(reader)?.0;
                let y = $tier::decode(reader)?.0;
                let z = $tier::decode(reader)?.0;
                Ok(Self(Vec3::new($from(x), $from(y), $from(z))))
            }
        }
    };
}

tiered_vec3!(HighResVec3, HighRes, |v: f32| v as f64, |v: f64| v as f32);
tiered_vec3!(StandardVec3, Standard, |v: f32| v, |v: f32| v);
tiered_vec3!(LowResVec3, LowRes, |v: f32| v, |v: f32| v);
tiered_vec3!(SmallVec3, Small, |v: f32| v, |v: f32| v);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StandardQuat(pub Quat);

impl WireEncode for StandardQuat {
    fn encode(&self, out: &mut Vec<u8>) {
        for component in self.0.to_array() {
            Standard(component).encode(out);
        }
    }
}

impl WireDecode for StandardQuat {
    fn decode(reader: &mut PacketReader<'_>) -> Result<Self, WireError> {
        let x = Standard::decode(reader)?.0;
        let y = Standard::decode(reader)?.0;
        let z = Standard::decode(reader)?.0;
        let w = Standard::decode(reader)?.0;
        Ok(Self(Quat::from_xyzw(x, y, z, w)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HighResVec4(pub Vec4);

impl WireEncode for HighResVec4 {
    fn encode(&self, out: &mut Vec<u8>) {
        for component in self.0.to_array() {
            HighRes(component as f64).encode(out);
        }
    }
}

impl WireDecode for HighResVec4 {
    fn decode(reader: &mut PacketReader<'_>) -> Result<Self, WireError> {
        let mut components = [0.0f32; 4];
        for component in &mut components {
            *component = HighRes::decode(reader)?.0 as f32;
        }
        Ok(Self(Vec4::from_array(components)))
    }
}
