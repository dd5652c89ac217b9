//! Payload Encoding
//!
//! Length-prefixed strings, tagged attribute values and items.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;

use crate::storage::{AttributeValue, Item, TableDescription};

const TAG_S: u8 = 0x01;
const TAG_N: u8 = 0x02;
const TAG_B: u8 = 0x03;
const TAG_BOOL: u8 = 0x04;
const TAG_NULL: u8 = 0x05;

fn eof(what: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("Not enough data for {}", what),
    )
}

pub fn put_bytes(buf: &mut BytesMut, data: &[u8]) {
    buf.put_u32(data.len() as u32);
    buf.put_slice(data);
}

pub fn put_string(buf: &mut BytesMut, s: &str) {
    put_bytes(buf, s.as_bytes());
}

pub fn get_bytes(buf: &mut Bytes) -> io::Result<Bytes> {
    if buf.remaining() < 4 {
        return Err(eof("length prefix"));
    }
    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
        return Err(eof("payload"));
    }
    Ok(buf.copy_to_bytes(len))
}

pub fn get_string(buf: &mut Bytes) -> io::Result<String> {
    let raw = get_bytes(buf)?;
    String::from_utf8(raw.to_vec())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "Invalid UTF-8"))
}

pub fn put_value(buf: &mut BytesMut, value: &AttributeValue) {
    match value {
        AttributeValue::S(s) => {
            buf.put_u8(TAG_S);
            put_string(buf, s);
        }
        AttributeValue::N(n) => {
            buf.put_u8(TAG_N);
            put_string(buf, n);
        }
        AttributeValue::B(b) => {
            buf.put_u8(TAG_B);
            put_bytes(buf, b);
        }
        AttributeValue::Bool(v) => {
            buf.put_u8(TAG_BOOL);
            buf.put_u8(*v as u8);
        }
        AttributeValue::Null => buf.put_u8(TAG_NULL),
    }
}

pub fn get_value(buf: &mut Bytes) -> io::Result<AttributeValue> {
    if !buf.has_remaining() {
        return Err(eof("value tag"));
    }
    match buf.get_u8() {
        TAG_S => Ok(AttributeValue::S(get_string(buf)?)),
        TAG_N => Ok(AttributeValue::N(get_string(buf)?)),
        TAG_B => Ok(AttributeValue::B(get_bytes(buf)?)),
        TAG_BOOL => {
            if !buf.has_remaining() {
                return Err(eof("bool"));
            }
            Ok(AttributeValue::Bool(buf.get_u8() != 0))
        }
        TAG_NULL => Ok(AttributeValue::Null),
        tag => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Unknown value tag: {}", tag),
        )),
    }
}

pub fn put_item(buf: &mut BytesMut, item: &Item) {
    buf.put_u32(item.len() as u32);
    for (name, value) in item {
        put_string(buf, name);
        put_value(buf, value);
    }
}

pub fn get_item(buf: &mut Bytes) -> io::Result<Item> {
    if buf.remaining() < 4 {
        return Err(eof("attribute count"));
    }
    let count = buf.get_u32() as usize;
    let mut item = Item::new();
    for _ in 0..count {
        let name = get_string(buf)?;
        let value = get_value(buf)?;
        item.insert(name, value);
    }
    Ok(item)
}

pub fn put_description(buf: &mut BytesMut, table: &TableDescription) {
    put_string(buf, &table.name);
    put_string(buf, &table.partition_key);
    put_string(buf, table.sort_key.as_deref().unwrap_or(""));
    buf.put_u64(table.item_count);
    put_string(buf, &table.status);
}

pub fn get_description(buf: &mut Bytes) -> io::Result<TableDescription> {
    let name = get_string(buf)?;
    let partition_key = get_string(buf)?;
    let sort_key = get_string(buf)?;
    if buf.remaining() < 8 {
        return Err(eof("item count"));
    }
    let item_count = buf.get_u64();
    let status = get_string(buf)?;
    Ok(TableDescription {
        name,
        partition_key,
        sort_key: (!sort_key.is_empty()).then_some(sort_key),
        item_count,
        status,
    })
}
