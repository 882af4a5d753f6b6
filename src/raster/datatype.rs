//! Pixel data types and their binary codecs
//!
//! Pixel values travel through the engine as f64 and are narrowed to the
//! declared storage type only at the container boundary. The wire codes
//! follow the GDAL numbering so headers stay readable next to other
//! geospatial tooling.

use byteorder::{ByteOrder, LittleEndian};

use crate::errors::{RasterMathError, RasterResult};

/// Storage data type of a raster band
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// Unsigned 8-bit integer
    UInt8,
    /// Unsigned 16-bit integer
    UInt16,
    /// Signed 16-bit integer
    Int16,
    /// Unsigned 32-bit integer
    UInt32,
    /// Signed 32-bit integer
    Int32,
    /// 32-bit float
    Float32,
    /// 64-bit float
    Float64,
}

impl DataType {
    /// Wire code for this type (GDAL numbering)
    pub fn code(&self) -> u8 {
        match self {
            DataType::UInt8 => 1,
            DataType::UInt16 => 2,
            DataType::Int16 => 3,
            DataType::UInt32 => 4,
            DataType::Int32 => 5,
            DataType::Float32 => 6,
            DataType::Float64 => 7,
        }
    }

    /// Resolve a wire code back to a data type
    pub fn from_code(code: u8) -> RasterResult<Self> {
        match code {
            1 => Ok(DataType::UInt8),
            2 => Ok(DataType::UInt16),
            3 => Ok(DataType::Int16),
            4 => Ok(DataType::UInt32),
            5 => Ok(DataType::Int32),
            6 => Ok(DataType::Float32),
            7 => Ok(DataType::Float64),
            other => Err(RasterMathError::UnsupportedDataType(other)),
        }
    }

    /// Lowercase name of this type
    pub fn name(&self) -> &'static str {
        match self {
            DataType::UInt8 => "uint8",
            DataType::UInt16 => "uint16",
            DataType::Int16 => "int16",
            DataType::UInt32 => "uint32",
            DataType::Int32 => "int32",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
        }
    }

    /// Resolve a name back to a data type
    pub fn from_name(name: &str) -> RasterResult<Self> {
        match name.to_lowercase().as_str() {
            "uint8" | "byte" => Ok(DataType::UInt8),
            "uint16" => Ok(DataType::UInt16),
            "int16" => Ok(DataType::Int16),
            "uint32" => Ok(DataType::UInt32),
            "int32" => Ok(DataType::Int32),
            "float32" | "float" => Ok(DataType::Float32),
            "float64" | "double" => Ok(DataType::Float64),
            other => Err(RasterMathError::GenericError(format!(
                "Unknown data type name: {}",
                other
            ))),
        }
    }

    /// Storage size of one value in bytes
    pub fn size_bytes(&self) -> usize {
        match self {
            DataType::UInt8 => 1,
            DataType::UInt16 | DataType::Int16 => 2,
            DataType::UInt32 | DataType::Int32 | DataType::Float32 => 4,
            DataType::Float64 => 8,
        }
    }

    /// Smallest type able to hold the given value range
    ///
    /// Integer ranges (both bounds with no fractional part) map to the
    /// narrowest integer type; anything else maps to a float type wide
    /// enough for the magnitudes involved.
    pub fn for_range(min: f64, max: f64) -> DataType {
        let integral = min.fract() == 0.0 && max.fract() == 0.0;

        if integral {
            if min >= 0.0 {
                if max <= u8::MAX as f64 {
                    return DataType::UInt8;
                }
                if max <= u16::MAX as f64 {
                    return DataType::UInt16;
                }
                if max <= u32::MAX as f64 {
                    return DataType::UInt32;
                }
            } else if min >= i16::MIN as f64 && max <= i16::MAX as f64 {
                return DataType::Int16;
            } else if min >= i32::MIN as f64 && max <= i32::MAX as f64 {
                return DataType::Int32;
            }
        }

        let magnitude = min.abs().max(max.abs());
        if magnitude <= f32::MAX as f64 {
            DataType::Float32
        } else {
            DataType::Float64
        }
    }

    /// Narrow a value to what this type can represent
    ///
    /// Integer types round and clamp to their range; Float32 goes through
    /// an f32 round-trip so stored and in-memory values agree.
    pub fn narrow(&self, value: f64) -> f64 {
        match self {
            DataType::UInt8 => value.round().clamp(u8::MIN as f64, u8::MAX as f64),
            DataType::UInt16 => value.round().clamp(u16::MIN as f64, u16::MAX as f64),
            DataType::Int16 => value.round().clamp(i16::MIN as f64, i16::MAX as f64),
            DataType::UInt32 => value.round().clamp(u32::MIN as f64, u32::MAX as f64),
            DataType::Int32 => value.round().clamp(i32::MIN as f64, i32::MAX as f64),
            DataType::Float32 => value as f32 as f64,
            DataType::Float64 => value,
        }
    }

    /// Encode values into little-endian bytes of this type
    pub fn encode(&self, values: &[f64], out: &mut Vec<u8>) {
        out.reserve(values.len() * self.size_bytes());
        for &value in values {
            let v = self.narrow(value);
            match self {
                DataType::UInt8 => out.push(v as u8),
                DataType::UInt16 => {
                    let mut buf = [0u8; 2];
                    LittleEndian::write_u16(&mut buf, v as u16);
                    out.extend_from_slice(&buf);
                }
                DataType::Int16 => {
                    let mut buf = [0u8; 2];
                    LittleEndian::write_i16(&mut buf, v as i16);
                    out.extend_from_slice(&buf);
                }
                DataType::UInt32 => {
                    let mut buf = [0u8; 4];
                    LittleEndian::write_u32(&mut buf, v as u32);
                    out.extend_from_slice(&buf);
                }
                DataType::Int32 => {
                    let mut buf = [0u8; 4];
                    LittleEndian::write_i32(&mut buf, v as i32);
                    out.extend_from_slice(&buf);
                }
                DataType::Float32 => {
                    let mut buf = [0u8; 4];
                    LittleEndian::write_f32(&mut buf, v as f32);
                    out.extend_from_slice(&buf);
                }
                DataType::Float64 => {
                    let mut buf = [0u8; 8];
                    LittleEndian::write_f64(&mut buf, v);
                    out.extend_from_slice(&buf);
                }
            }
        }
    }

    /// Decode little-endian bytes of this type back into values
    pub fn decode(&self, bytes: &[u8]) -> RasterResult<Vec<f64>> {
        let size = self.size_bytes();
        if bytes.len() % size != 0 {
            return Err(RasterMathError::GenericError(format!(
                "Byte length {} is not a multiple of the {} value size {}",
                bytes.len(),
                self.name(),
                size
            )));
        }

        let mut values = Vec::with_capacity(bytes.len() / size);
        for chunk in bytes.chunks_exact(size) {
            let value = match self {
                DataType::UInt8 => chunk[0] as f64,
                DataType::UInt16 => LittleEndian::read_u16(chunk) as f64,
                DataType::Int16 => LittleEndian::read_i16(chunk) as f64,
                DataType::UInt32 => LittleEndian::read_u32(chunk) as f64,
                DataType::Int32 => LittleEndian::read_i32(chunk) as f64,
                DataType::Float32 => LittleEndian::read_f32(chunk) as f64,
                DataType::Float64 => LittleEndian::read_f64(chunk),
            };
            values.push(value);
        }
        Ok(values)
    }
}
