// Components are escaped so they never contain the separator.

pub const KEY_SEP: char = '\x1f';

const ESCAPE: u8 = b'%';
const HEX: &[u8; 16] = b"0123456789ABCDEF";

/// Fixed-width hex so that lexical key order matches creation order.
pub fn entity_key(seq: u64) -> String {
    format!("{seq:016x}")
}

pub fn property_key(entity: &str, key: &str) -> String {
    join(&[entity, key])
}

pub fn property_prefix(entity: &str) -> String {
    prefix(&[entity])
}

pub fn index_key(key: &str, value: &str, node: &str) -> String {
    join(&[key, value, node])
}

pub fn index_prefix(key: &str, value: &str) -> String {
    prefix(&[key, value])
}

pub fn adjacency_key(node: &str, edge: &str) -> String {
    join(&[node, edge])
}

pub fn adjacency_prefix(node: &str) -> String {
    prefix(&[node])
}

pub fn edge_record(from: &str, to: &str, label: &str) -> String {
    join(&[from, to, label])
}

/// Splits a joined key into exactly `N` unescaped components.
pub fn split_decoded<const N: usize>(value: &str) -> Option<[String; N]> {
    let parts = value
        .splitn(N, KEY_SEP)
        .map(unescape)
        .collect::<Option<Vec<_>>>()?;
    parts.try_into().ok()
}

fn join(parts: &[&str]) -> String {
    let mut key = String::new();
    for (position, part) in parts.iter().enumerate() {
        if position > 0 {
            key.push(KEY_SEP);
        }
        escape_into(&mut key, part);
    }
    key
}

fn prefix(parts: &[&str]) -> String {
    let mut key = join(parts);
    key.push(KEY_SEP);
    key
}

fn escape_into(out: &mut String, part: &str) {
    for &byte in part.as_bytes() {
        if byte.is_ascii() && byte != ESCAPE && byte != KEY_SEP as u8 {
            out.push(byte as char);
        } else {
            out.push(ESCAPE as char);
            out.push(HEX[usize::from(byte >> 4)] as char);
            out.push(HEX[usize::from(byte & 0x0f)] as char);
        }
    }
}

fn unescape(part: &str) -> Option<String> {
    let mut bytes = part.bytes();
    let mut raw = Vec::with_capacity(part.len());
    while let Some(byte) = bytes.next() {
        if byte != ESCAPE {
            raw.push(byte);
            continue;
        }
        let high = hex_value(bytes.next()?)?;
        let low = hex_value(bytes.next()?)?;
        raw.push(high << 4 | low);
    }
    String::from_utf8(raw).ok()
}

fn hex_value(digit: u8) -> Option<u8> {
    (digit as char).to_digit(16).map(|value| value as u8)
}
