mod codec;
mod packet;

pub use codec::{
    HighRes, HighResVec3, HighResVec4, LowRes, LowResVec3, Small, SmallVec3, Standard,
    StandardQuat, StandardVec3, WireDecode, WireEncode, WireError, LOW_RES_MAX, LOW_RES_SCALE,
    SMALL_SCALE,
};
pub use packet::{Packet, PacketReader};
