//! Typed, named-field serialization for chunk parameters.
//!
//! Every chunk body is a sequence of fields. Each field is written as a tag
//! byte identifying its type, the field's name, and then its value:
//!
//! - integers are LEB128, signed or unsigned as appropriate;
//! - `f32` values are four little-endian bytes;
//! - byte payloads, strings and arrays are a LEB128 element count followed by
//!   the elements.
//!
//! Writing and reading go through the same code: a type implements `Serialise`
//! once, by handing each of its fields to a `Serialiser`. A `WriteSerialiser`
//! appends the fields' values to a buffer; a `ReadSerialiser` checks each
//! field's tag and name against the buffer and stores the value it finds. So a
//! chunk's layout can't drift between the capture and replay sides.
//!
//! Since each field carries its own name and type, tools can decode chunks
//! they know nothing about; see `decode_fields`.

use crate::error::SerialError;
use crate::resource::ResourceId;

use std::convert::{Infallible, TryFrom};
use std::fmt;

/// The type tags that precede each serialized field.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum FieldTag {
    UInt = 1,
    SInt = 2,
    Float = 3,
    Bool = 4,
    Id = 5,
    Bytes = 6,
    Str = 7,
    FloatArray = 8,
    IntArray = 9,
    IdArray = 10,
}

impl FieldTag {
    fn from_byte(byte: u8) -> Option<FieldTag> {
        use FieldTag::*;
        Some(match byte {
            1 => UInt,
            2 => SInt,
            3 => Float,
            4 => Bool,
            5 => Id,
            6 => Bytes,
            7 => Str,
            8 => FloatArray,
            9 => IntArray,
            10 => IdArray,
            _ => return None,
        })
    }
}

/// A direction-neutral view of a chunk body being written or read.
///
/// Each method handles one named field. When writing, the method records the
/// value `value` points to. When reading, it checks the next field's tag and
/// name, and overwrites `*value` with what it finds.
pub trait Serialiser {
    type Error;

    fn is_reading(&self) -> bool;

    /// An unsigned integer, at most `max` when read back.
    fn uint(&mut self, name: &'static str, value: &mut u64, max: u64) -> Result<(), Self::Error>;

    /// A signed integer, within `min..=max` when read back.
    fn sint(
        &mut self,
        name: &'static str,
        value: &mut i64,
        min: i64,
        max: i64,
    ) -> Result<(), Self::Error>;

    fn float(&mut self, name: &'static str, value: &mut f32) -> Result<(), Self::Error>;
    fn boolean(&mut self, name: &'static str, value: &mut bool) -> Result<(), Self::Error>;
    fn id(&mut self, name: &'static str, value: &mut ResourceId) -> Result<(), Self::Error>;
    fn bytes(&mut self, name: &'static str, value: &mut Vec<u8>) -> Result<(), Self::Error>;
    fn string(&mut self, name: &'static str, value: &mut String) -> Result<(), Self::Error>;
    fn float_array(&mut self, name: &'static str, value: &mut Vec<f32>)
        -> Result<(), Self::Error>;
    fn int_array(&mut self, name: &'static str, value: &mut Vec<i32>) -> Result<(), Self::Error>;
    fn id_array(&mut self, name: &'static str, value: &mut Vec<ResourceId>)
        -> Result<(), Self::Error>;

    /// The length of a list of nested records that follows. When reading, the
    /// count is checked against the data remaining, so a corrupt count can't
    /// provoke a huge allocation.
    fn count(&mut self, name: &'static str, value: &mut usize) -> Result<(), Self::Error>;
}

/// A type that can be written to and read from a `Serialiser`.
pub trait Serialise {
    fn serialise<S: Serialiser>(&mut self, ser: &mut S) -> Result<(), S::Error>;
}

/// A type that can appear as a named field of a `Serialise` type.
pub trait SerialiseField {
    fn serialise_field<S: Serialiser>(
        &mut self,
        name: &'static str,
        ser: &mut S,
    ) -> Result<(), S::Error>;
}

macro_rules! unsigned_fields {
    ( $( $type:ty ),* ) => {
        $(
            impl SerialiseField for $type {
                fn serialise_field<S: Serialiser>(&mut self, name: &'static str, ser: &mut S)
                                                  -> Result<(), S::Error>
                {
                    let mut wide = *self as u64;
                    ser.uint(name, &mut wide, <$type>::MAX as u64)?;
                    *self = wide as $type;
                    Ok(())
                }
            }
        )*
    }
}

macro_rules! signed_fields {
    ( $( $type:ty ),* ) => {
        $(
            impl SerialiseField for $type {
                fn serialise_field<S: Serialiser>(&mut self, name: &'static str, ser: &mut S)
                                                  -> Result<(), S::Error>
                {
                    let mut wide = *self as i64;
                    ser.sint(name, &mut wide,
                             <$type>::MIN as i64, <$type>::MAX as i64)?;
                    *self = wide as $type;
                    Ok(())
                }
            }
        )*
    }
}

// The reader range-checks these before the narrowing casts above.
unsigned_fields!(u32, u64, usize);
signed_fields!(i32, i64);

macro_rules! direct_fields {
    ( $( $type:ty => $method:ident ),* ) => {
        $(
            impl SerialiseField for $type {
                fn serialise_field<S: Serialiser>(&mut self, name: &'static str, ser: &mut S)
                                                  -> Result<(), S::Error>
                {
                    ser.$method(name, self)
                }
            }
        )*
    }
}

direct_fields! {
    f32 => float,
    bool => boolean,
    ResourceId => id,
    Vec<u8> => bytes,
    String => string,
    Vec<f32> => float_array,
    Vec<i32> => int_array,
    Vec<ResourceId> => id_array
}

/// Serialise a list of nested records as a count followed by each record.
pub fn serialise_list<S, T>(ser: &mut S, name: &'static str, items: &mut Vec<T>)
                            -> Result<(), S::Error>
where
    S: Serialiser,
    T: Serialise + Default,
{
    let mut count = items.len();
    ser.count(name, &mut count)?;
    if ser.is_reading() {
        items.clear();
        items.resize_with(count, T::default);
    }
    for item in items.iter_mut() {
        item.serialise(ser)?;
    }
    Ok(())
}

/// Define structs whose fields are serialized in declaration order, under
/// their own names.
macro_rules! serialised_struct {
    ( $( $(#[$attr:meta])* pub struct $name:ident { $( $field:ident : $type:ty ),* $(,)? } )* ) => {
        $(
            $(#[$attr])*
            #[derive(Clone, Debug, Default, PartialEq)]
            pub struct $name {
                $( pub $field: $type, )*
            }

            impl $crate::serial::Serialise for $name {
                #[allow(unused_variables)]
                fn serialise<S: $crate::serial::Serialiser>(&mut self, ser: &mut S)
                                                           -> Result<(), S::Error>
                {
                    $(
                        $crate::serial::SerialiseField::serialise_field(
                            &mut self.$field, stringify!($field), ser)?;
                    )*
                    Ok(())
                }
            }
        )*
    }
}

/// Serialize `value` to a fresh byte vector.
///
/// This takes `&mut` only because `Serialise` is shared with reading; writing
/// never modifies `value`.
pub fn to_bytes<T: Serialise>(value: &mut T) -> Vec<u8> {
    let mut ser = WriteSerialiser::new();
    match value.serialise(&mut ser) {
        Ok(()) => {}
        Err(never) => match never {},
    }
    ser.into_bytes()
}

/// Deserialize a `T` from `bytes`, which must hold exactly one `T`. On
/// failure, return the error and the number of trailing bytes, if any.
pub fn from_bytes<T: Serialise + Default>(bytes: &[u8]) -> Result<(T, usize), SerialError> {
    let mut reader = ReadSerialiser::new(bytes);
    let mut value = T::default();
    value.serialise(&mut reader)?;
    Ok((value, reader.remaining()))
}

/// A `Serialiser` that appends fields to a byte vector.
#[derive(Debug, Default)]
pub struct WriteSerialiser {
    out: Vec<u8>,
}

impl WriteSerialiser {
    pub fn new() -> WriteSerialiser {
        WriteSerialiser::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.out
    }

    fn uleb(&mut self, value: u64) {
        // Writes to a `Vec` can't fail.
        let _ = leb128::write::unsigned(&mut self.out, value);
    }

    fn header(&mut self, name: &'static str, tag: FieldTag) {
        self.out.push(tag as u8);
        self.uleb(name.len() as u64);
        self.out.extend_from_slice(name.as_bytes());
    }
}

impl Serialiser for WriteSerialiser {
    type Error = Infallible;

    fn is_reading(&self) -> bool {
        false
    }

    fn uint(&mut self, name: &'static str, value: &mut u64, _max: u64) -> Result<(), Infallible> {
        self.header(name, FieldTag::UInt);
        self.uleb(*value);
        Ok(())
    }

    fn sint(&mut self, name: &'static str, value: &mut i64, _min: i64, _max: i64)
            -> Result<(), Infallible>
    {
        self.header(name, FieldTag::SInt);
        let _ = leb128::write::signed(&mut self.out, *value);
        Ok(())
    }

    fn float(&mut self, name: &'static str, value: &mut f32) -> Result<(), Infallible> {
        self.header(name, FieldTag::Float);
        self.out.extend_from_slice(&value.to_le_bytes());
        Ok(())
    }

    fn boolean(&mut self, name: &'static str, value: &mut bool) -> Result<(), Infallible> {
        self.header(name, FieldTag::Bool);
        self.out.push(*value as u8);
        Ok(())
    }

    fn id(&mut self, name: &'static str, value: &mut ResourceId) -> Result<(), Infallible> {
        self.header(name, FieldTag::Id);
        self.uleb(value.raw());
        Ok(())
    }

    fn bytes(&mut self, name: &'static str, value: &mut Vec<u8>) -> Result<(), Infallible> {
        self.header(name, FieldTag::Bytes);
        self.uleb(value.len() as u64);
        self.out.extend_from_slice(value);
        Ok(())
    }

    fn string(&mut self, name: &'static str, value: &mut String) -> Result<(), Infallible> {
        self.header(name, FieldTag::Str);
        self.uleb(value.len() as u64);
        self.out.extend_from_slice(value.as_bytes());
        Ok(())
    }

    fn float_array(&mut self, name: &'static str, value: &mut Vec<f32>)
                   -> Result<(), Infallible>
    {
        self.header(name, FieldTag::FloatArray);
        self.uleb(value.len() as u64);
        for elt in value.iter() {
            self.out.extend_from_slice(&elt.to_le_bytes());
        }
        Ok(())
    }

    fn int_array(&mut self, name: &'static str, value: &mut Vec<i32>) -> Result<(), Infallible> {
        self.header(name, FieldTag::IntArray);
        self.uleb(value.len() as u64);
        for &elt in value.iter() {
            let _ = leb128::write::signed(&mut self.out, i64::from(elt));
        }
        Ok(())
    }

    fn id_array(&mut self, name: &'static str, value: &mut Vec<ResourceId>)
                -> Result<(), Infallible>
    {
        self.header(name, FieldTag::IdArray);
        self.uleb(value.len() as u64);
        for elt in value.iter() {
            self.uleb(elt.raw());
        }
        Ok(())
    }

    fn count(&mut self, name: &'static str, value: &mut usize) -> Result<(), Infallible> {
        self.header(name, FieldTag::UInt);
        self.uleb(*value as u64);
        Ok(())
    }
}

/// A `Serialiser` that reads fields back out of a byte slice.
pub struct ReadSerialiser<'a> {
    buf: &'a [u8],
}

impl<'a> ReadSerialiser<'a> {
    pub fn new(buf: &'a [u8]) -> ReadSerialiser<'a> {
        ReadSerialiser { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], SerialError> {
        if self.buf.len() < len {
            return Err(SerialError::UnexpectedEof);
        }
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    fn byte(&mut self) -> Result<u8, SerialError> {
        Ok(self.take(1)?[0])
    }

    fn uleb(&mut self) -> Result<u64, SerialError> {
        leb128::read::unsigned(&mut self.buf).map_err(leb128_error)
    }

    fn sleb(&mut self) -> Result<i64, SerialError> {
        leb128::read::signed(&mut self.buf).map_err(leb128_error)
    }

    fn f32(&mut self) -> Result<f32, SerialError> {
        let bytes = self.take(4)?;
        Ok(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read an element count, and check that at least `count * min_size` bytes
    /// remain.
    fn length(&mut self, name: &'static str, min_size: usize) -> Result<usize, SerialError> {
        let count = usize::try_from(self.uleb()?).map_err(|_| SerialError::OutOfRange(name))?;
        match count.checked_mul(min_size) {
            Some(bytes) if bytes <= self.buf.len() => Ok(count),
            _ => Err(SerialError::UnexpectedEof),
        }
    }

    fn name(&mut self) -> Result<&'a str, SerialError> {
        let len = self.length("field name", 1)?;
        std::str::from_utf8(self.take(len)?).map_err(|_| SerialError::BadUtf8)
    }

    fn header(&mut self, name: &'static str, tag: FieldTag) -> Result<(), SerialError> {
        let found = self.byte()?;
        if found != tag as u8 {
            return Err(SerialError::BadTag {
                field: name,
                expected: tag as u8,
                found,
            });
        }
        let found = self.name()?;
        if found != name {
            return Err(SerialError::FieldName {
                expected: name,
                found: found.to_string(),
            });
        }
        Ok(())
    }

    fn id_value(&mut self) -> Result<ResourceId, SerialError> {
        Ok(ResourceId::from_raw(self.uleb()?))
    }

    /// Read the next field without knowing its name or type in advance.
    fn any_field(&mut self) -> Result<DecodedField, SerialError> {
        let byte = self.byte()?;
        let tag = FieldTag::from_byte(byte).ok_or(SerialError::BadTag {
            field: "?",
            expected: 0,
            found: byte,
        })?;
        let name = self.name()?.to_string();
        let value = match tag {
            FieldTag::UInt => FieldValue::UInt(self.uleb()?),
            FieldTag::SInt => FieldValue::SInt(self.sleb()?),
            FieldTag::Float => FieldValue::Float(self.f32()?),
            FieldTag::Bool => FieldValue::Bool(self.byte()? != 0),
            FieldTag::Id => FieldValue::Id(self.id_value()?),
            FieldTag::Bytes => {
                let len = self.length("bytes", 1)?;
                FieldValue::Bytes(self.take(len)?.to_vec())
            }
            FieldTag::Str => {
                let len = self.length("string", 1)?;
                let text = std::str::from_utf8(self.take(len)?).map_err(|_| SerialError::BadUtf8)?;
                FieldValue::Str(text.to_string())
            }
            FieldTag::FloatArray => {
                let mut values = vec![];
                self.float_array_body("floats", &mut values)?;
                FieldValue::FloatArray(values)
            }
            FieldTag::IntArray => {
                let mut values = vec![];
                self.int_array_body("ints", &mut values)?;
                FieldValue::IntArray(values)
            }
            FieldTag::IdArray => {
                let mut values = vec![];
                self.id_array_body("ids", &mut values)?;
                FieldValue::IdArray(values)
            }
        };
        Ok(DecodedField { name, value })
    }

    fn float_array_body(&mut self, name: &'static str, value: &mut Vec<f32>)
                        -> Result<(), SerialError>
    {
        let len = self.length(name, 4)?;
        value.clear();
        for _ in 0..len {
            value.push(self.f32()?);
        }
        Ok(())
    }

    fn int_array_body(&mut self, name: &'static str, value: &mut Vec<i32>)
                      -> Result<(), SerialError>
    {
        let len = self.length(name, 1)?;
        value.clear();
        for _ in 0..len {
            let elt = i32::try_from(self.sleb()?).map_err(|_| SerialError::OutOfRange(name))?;
            value.push(elt);
        }
        Ok(())
    }

    fn id_array_body(&mut self, name: &'static str, value: &mut Vec<ResourceId>)
                     -> Result<(), SerialError>
    {
        let len = self.length(name, 1)?;
        value.clear();
        for _ in 0..len {
            value.push(self.id_value()?);
        }
        Ok(())
    }
}

fn leb128_error(err: leb128::read::Error) -> SerialError {
    match err {
        leb128::read::Error::Overflow => SerialError::Leb128Overflow,
        leb128::read::Error::IoError(_) => SerialError::UnexpectedEof,
    }
}

impl<'a> Serialiser for ReadSerialiser<'a> {
    type Error = SerialError;

    fn is_reading(&self) -> bool {
        true
    }

    fn uint(&mut self, name: &'static str, value: &mut u64, max: u64) -> Result<(), SerialError> {
        self.header(name, FieldTag::UInt)?;
        let found = self.uleb()?;
        if found > max {
            return Err(SerialError::OutOfRange(name));
        }
        *value = found;
        Ok(())
    }

    fn sint(&mut self, name: &'static str, value: &mut i64, min: i64, max: i64)
            -> Result<(), SerialError>
    {
        self.header(name, FieldTag::SInt)?;
        let found = self.sleb()?;
        if found < min || found > max {
            return Err(SerialError::OutOfRange(name));
        }
        *value = found;
        Ok(())
    }

    fn float(&mut self, name: &'static str, value: &mut f32) -> Result<(), SerialError> {
        self.header(name, FieldTag::Float)?;
        *value = self.f32()?;
        Ok(())
    }

    fn boolean(&mut self, name: &'static str, value: &mut bool) -> Result<(), SerialError> {
        self.header(name, FieldTag::Bool)?;
        *value = match self.byte()? {
            0 => false,
            1 => true,
            _ => return Err(SerialError::OutOfRange(name)),
        };
        Ok(())
    }

    fn id(&mut self, name: &'static str, value: &mut ResourceId) -> Result<(), SerialError> {
        self.header(name, FieldTag::Id)?;
        *value = self.id_value()?;
        Ok(())
    }

    fn bytes(&mut self, name: &'static str, value: &mut Vec<u8>) -> Result<(), SerialError> {
        self.header(name, FieldTag::Bytes)?;
        let len = self.length(name, 1)?;
        value.clear();
        value.extend_from_slice(self.take(len)?);
        Ok(())
    }

    fn string(&mut self, name: &'static str, value: &mut String) -> Result<(), SerialError> {
        self.header(name, FieldTag::Str)?;
        let len = self.length(name, 1)?;
        let text = std::str::from_utf8(self.take(len)?).map_err(|_| SerialError::BadUtf8)?;
        value.clear();
        value.push_str(text);
        Ok(())
    }

    fn float_array(&mut self, name: &'static str, value: &mut Vec<f32>)
                   -> Result<(), SerialError>
    {
        self.header(name, FieldTag::FloatArray)?;
        self.float_array_body(name, value)
    }

    fn int_array(&mut self, name: &'static str, value: &mut Vec<i32>) -> Result<(), SerialError> {
        self.header(name, FieldTag::IntArray)?;
        self.int_array_body(name, value)
    }

    fn id_array(&mut self, name: &'static str, value: &mut Vec<ResourceId>)
                -> Result<(), SerialError>
    {
        self.header(name, FieldTag::IdArray)?;
        self.id_array_body(name, value)
    }

    fn count(&mut self, name: &'static str, value: &mut usize) -> Result<(), SerialError> {
        self.header(name, FieldTag::UInt)?;
        *value = self.length(name, 1)?;
        Ok(())
    }
}

/// A field decoded without knowledge of the record it belongs to.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedField {
    pub name: String,
    pub value: FieldValue,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    UInt(u64),
    SInt(i64),
    Float(f32),
    Bool(bool),
    Id(ResourceId),
    Bytes(Vec<u8>),
    Str(String),
    FloatArray(Vec<f32>),
    IntArray(Vec<i32>),
    IdArray(Vec<ResourceId>),
}

/// Decode every field in `body`.
pub fn decode_fields(body: &[u8]) -> Result<Vec<DecodedField>, SerialError> {
    let mut reader = ReadSerialiser::new(body);
    let mut fields = vec![];
    while reader.remaining() > 0 {
        fields.push(reader.any_field()?);
    }
    Ok(fields)
}

impl fmt::Display for DecodedField {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: ", self.name)?;
        match &self.value {
            FieldValue::UInt(v) => write!(f, "{}", v),
            FieldValue::SInt(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Bool(v) => write!(f, "{}", v),
            FieldValue::Id(v) => write!(f, "{}", v),
            FieldValue::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            FieldValue::Str(v) => write!(f, "{:?}", v),
            FieldValue::FloatArray(v) => write!(f, "{:?}", v),
            FieldValue::IntArray(v) => write!(f, "{:?}", v),
            FieldValue::IdArray(v) => {
                let ids: Vec<String> = v.iter().map(|id| id.to_string()).collect();
                write!(f, "[{}]", ids.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    serialised_struct! {
        pub struct Sample {
            level: i32,
            size: u64,
            target: u32,
            scale: f32,
            normalized: bool,
            texture: ResourceId,
            data: Vec<u8>,
            label: String,
            color: Vec<f32>,
            firsts: Vec<i32>,
            units: Vec<ResourceId>,
        }
    }

    fn sample() -> Sample {
        Sample {
            level: -3,
            size: 1 << 40,
            target: 0x0de1,
            scale: 0.5,
            normalized: true,
            texture: ResourceId::from_raw(17),
            data: vec![1, 2, 3],
            label: "atlas".to_string(),
            color: vec![1.0, 0.25],
            firsts: vec![0, -1, 300],
            units: vec![ResourceId::NULL, ResourceId::from_raw(5)],
        }
    }

    #[test]
    fn same_code_reads_and_writes() {
        let mut written = sample();
        let bytes = to_bytes(&mut written);
        let (read, trailing) = from_bytes::<Sample>(&bytes).unwrap();
        assert_eq!(trailing, 0);
        assert_eq!(read, sample());
    }

    #[test]
    fn field_names_are_checked() {
        serialised_struct! {
            pub struct Renamed { depth: i32 }
        }
        let bytes = to_bytes(&mut sample());
        match from_bytes::<Renamed>(&bytes) {
            Err(SerialError::FieldName { expected, found }) => {
                assert_eq!(expected, "depth");
                assert_eq!(found, "level");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn field_types_are_checked() {
        serialised_struct! {
            pub struct Retyped { level: u32 }
        }
        let bytes = to_bytes(&mut sample());
        assert!(matches!(
            from_bytes::<Retyped>(&bytes),
            Err(SerialError::BadTag { field: "level", .. })
        ));
    }

    #[test]
    fn narrow_fields_are_range_checked() {
        serialised_struct! {
            pub struct Wide { value: u64 }
            pub struct Narrow { value: u32 }
        }
        let bytes = to_bytes(&mut Wide { value: 1 << 33 });
        assert!(matches!(
            from_bytes::<Narrow>(&bytes),
            Err(SerialError::OutOfRange("value"))
        ));
    }

    #[test]
    fn truncation() {
        let bytes = to_bytes(&mut sample());
        for len in 0..bytes.len() {
            assert!(from_bytes::<Sample>(&bytes[..len]).is_err(), "length {}", len);
        }
    }

    #[test]
    fn self_describing() {
        let bytes = to_bytes(&mut sample());
        let fields = decode_fields(&bytes).unwrap();
        assert_eq!(fields.len(), 11);
        assert_eq!(fields[0].to_string(), "level: -3");
        assert_eq!(fields[5].to_string(), "texture: res#17");
        assert_eq!(fields[6].to_string(), "data: <3 bytes>");
        assert_eq!(fields[10].to_string(), "units: [res#0, res#5]");
    }
}
