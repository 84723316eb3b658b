use num::NumCast;

use crate::Error;

/// Raster band data type, using the type names of the underlying raster library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterDataType {
    Byte,
    Int8,
    UInt16,
    Int16,
    UInt32,
    Int32,
    UInt64,
    Int64,
    Float32,
    Float64,
}

impl RasterDataType {
    pub fn to_str(&self) -> &'static str {
        match self {
            Self::Byte => "Byte",
            Self::Int8 => "Int8",
            Self::UInt16 => "UInt16",
            Self::Int16 => "Int16",
            Self::UInt32 => "UInt32",
            Self::Int32 => "Int32",
            Self::UInt64 => "UInt64",
            Self::Int64 => "Int64",
            Self::Float32 => "Float32",
            Self::Float64 => "Float64",
        }
    }

    pub fn is_floating_point(&self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }

    /// Checks whether `value` survives a round trip through this data type unchanged.
    /// NaN is only representable in the floating point types.
    pub fn can_represent(&self, value: f64) -> bool {
        if value.is_nan() {
            return self.is_floating_point();
        }

        fn round_trips<T: NumCast + num::ToPrimitive>(value: f64) -> bool {
            match <T as NumCast>::from(value) {
                Some(converted) => converted.to_f64() == Some(value),
                None => false,
            }
        }

        match self {
            Self::Byte => round_trips::<u8>(value),
            Self::Int8 => round_trips::<i8>(value),
            Self::UInt16 => round_trips::<u16>(value),
            Self::Int16 => round_trips::<i16>(value),
            Self::UInt32 => round_trips::<u32>(value),
            Self::Int32 => round_trips::<i32>(value),
            Self::UInt64 => round_trips::<u64>(value),
            Self::Int64 => round_trips::<i64>(value),
            Self::Float32 => round_trips::<f32>(value),
            Self::Float64 => true,
        }
    }
}

impl std::fmt::Display for RasterDataType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

impl std::str::FromStr for RasterDataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Byte" => Ok(Self::Byte),
            "Int8" => Ok(Self::Int8),
            "UInt16" => Ok(Self::UInt16),
            "Int16" => Ok(Self::Int16),
            "UInt32" => Ok(Self::UInt32),
            "Int32" => Ok(Self::Int32),
            "UInt64" => Ok(Self::UInt64),
            "Int64" => Ok(Self::Int64),
            "Float32" => Ok(Self::Float32),
            "Float64" => Ok(Self::Float64),
            _ => Err(Error::InvalidArgument(format!("Unknown data type name: {s}"))),
        }
    }
}
