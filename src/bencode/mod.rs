//! Bencode decoding.
///
/// Mirrors the teacher's `encoder_decoder::bencode` module (recursive
/// descent over a byte slice), generalized to also report the raw byte span
/// of every value it parses. The span is what lets `metainfo` compute the
/// info-hash over the `info` dictionary's bytes exactly as they appeared in
/// the `.torrent` file, instead of re-encoding a decoded value and hoping
/// the encoding matches (spec.md §6: "SHA-1 of the raw bencoded bytes...
/// as they appear in the source file").
use std::collections::BTreeMap;

#[derive(PartialEq, Debug, Clone)]
pub enum Bencode {
    BNumber(i64),
    BString(Vec<u8>),
    BList(Vec<Bencode>),
    BDict(BTreeMap<Vec<u8>, Bencode>),
}

#[derive(PartialEq, Debug)]
pub enum BencodeError {
    UnexpectedEnd,
    InvalidBencode,
    InvalidBencodeNumber,
    InvalidBencodeString,
    InvalidBencodeDictKey,
    TrailingData,
}

impl Bencode {
    /// Parses a full bencoded buffer. Errs on trailing bytes after the value.
    pub fn decode(data: &[u8]) -> Result<Bencode, BencodeError> {
        let (value, consumed, _span) = Self::decode_span(data)?;
        if consumed != data.len() {
            return Err(BencodeError::TrailingData);
        }
        Ok(value)
    }

    /// Parses a single bencoded value from the start of `data` and returns
    /// it along with the byte span `(start, end)` it occupied, relative to
    /// `data`. Ignores trailing bytes after the value.
    pub fn decode_span(data: &[u8]) -> Result<(Bencode, usize, (usize, usize)), BencodeError> {
        let (value, consumed) = Self::do_decode(data)?;
        Ok((value, consumed, (0, consumed)))
    }

    /// Finds the byte span, within `data`, of the value associated with
    /// `dict_key` inside the top-level dictionary. Used to carve out the raw
    /// `info` bytes for the info-hash.
    pub fn find_top_level_dict_value_span(
        data: &[u8],
        dict_key: &[u8],
    ) -> Result<(usize, usize), BencodeError> {
        if data.first() != Some(&b'd') {
            return Err(BencodeError::InvalidBencode);
        }
        let mut i = 1;
        while data.get(i) != Some(&b'e') {
            let (key, key_len) = Self::do_decode(&data[i..])?;
            let key_start = i;
            i += key_len;
            let value_start = i;
            let (_, value_len) = Self::do_decode(&data[i..])?;
            i += value_len;

            let is_match = matches!(&key, Bencode::BString(s) if s.as_slice() == dict_key);
            if is_match {
                return Ok((value_start, value_start + value_len));
            }
            let _ = key_start;
        }
        Err(BencodeError::InvalidBencodeDictKey)
    }

    fn do_decode(data: &[u8]) -> Result<(Bencode, usize), BencodeError> {
        match data.first() {
            Some(b'i') => Self::decode_number(data),
            Some(b'l') => Self::decode_list(data),
            Some(b'd') => Self::decode_dict(data),
            Some(b'0'..=b'9') => Self::decode_string(data),
            Some(_) => Err(BencodeError::InvalidBencode),
            None => Err(BencodeError::UnexpectedEnd),
        }
    }

    fn decode_string(data: &[u8]) -> Result<(Bencode, usize), BencodeError> {
        let mut i = 0;
        while *data.get(i).ok_or(BencodeError::UnexpectedEnd)? != b':' {
            i += 1;
        }
        let length: usize = std::str::from_utf8(&data[0..i])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(BencodeError::InvalidBencodeString)?;
        let start = i + 1;
        let end = start + length;
        let bytes = data
            .get(start..end)
            .ok_or(BencodeError::UnexpectedEnd)?
            .to_vec();
        Ok((Bencode::BString(bytes), end))
    }

    fn decode_number(data: &[u8]) -> Result<(Bencode, usize), BencodeError> {
        let mut i = 1;
        while *data.get(i).ok_or(BencodeError::UnexpectedEnd)? != b'e' {
            i += 1;
        }
        let number = std::str::from_utf8(&data[1..i])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(BencodeError::InvalidBencodeNumber)?;
        Ok((Bencode::BNumber(number), i + 1))
    }

    fn decode_list(data: &[u8]) -> Result<(Bencode, usize), BencodeError> {
        let mut i = 1;
        let mut list = Vec::new();
        while *data.get(i).ok_or(BencodeError::UnexpectedEnd)? != b'e' {
            let (value, size) = Self::do_decode(&data[i..])?;
            list.push(value);
            i += size;
        }
        Ok((Bencode::BList(list), i + 1))
    }

    fn decode_dict(data: &[u8]) -> Result<(Bencode, usize), BencodeError> {
        let mut i = 1;
        let mut dict = BTreeMap::new();
        while *data.get(i).ok_or(BencodeError::UnexpectedEnd)? != b'e' {
            let (key, key_size) = Self::do_decode(&data[i..])?;
            i += key_size;
            let (value, value_size) = Self::do_decode(&data[i..])?;
            i += value_size;
            match key {
                Bencode::BString(key) => dict.insert(key, value),
                _ => return Err(BencodeError::InvalidBencodeDictKey),
            };
        }
        Ok((Bencode::BDict(dict), i + 1))
    }

    pub fn as_dict(&self) -> Option<&BTreeMap<Vec<u8>, Bencode>> {
        match self {
            Bencode::BDict(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&[u8]> {
        match self {
            Bencode::BString(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<i64> {
        match self {
            Bencode::BNumber(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Bencode]> {
        match self {
            Bencode::BList(l) => Some(l),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_string() {
        assert_eq!(
            Bencode::decode(b"4:spam").unwrap(),
            Bencode::BString(b"spam".to_vec())
        );
    }

    #[test]
    fn decode_empty_string() {
        assert_eq!(Bencode::decode(b"0:").unwrap(), Bencode::BString(vec![]));
    }

    #[test]
    fn decode_integers() {
        assert_eq!(Bencode::decode(b"i3e").unwrap(), Bencode::BNumber(3));
        assert_eq!(Bencode::decode(b"i-3e").unwrap(), Bencode::BNumber(-3));
    }

    #[test]
    fn decode_list() {
        assert_eq!(
            Bencode::decode(b"l4:spam4:eggse").unwrap(),
            Bencode::BList(vec![
                Bencode::BString(b"spam".to_vec()),
                Bencode::BString(b"eggs".to_vec()),
            ])
        );
    }

    #[test]
    fn decode_dict() {
        let mut dict = BTreeMap::new();
        dict.insert(b"cow".to_vec(), Bencode::BString(b"moo".to_vec()));
        dict.insert(b"spam".to_vec(), Bencode::BString(b"eggs".to_vec()));
        assert_eq!(
            Bencode::decode(b"d3:cow3:moo4:spam4:eggse").unwrap(),
            Bencode::BDict(dict)
        );
    }

    #[test]
    fn trailing_data_is_rejected() {
        assert_eq!(
            Bencode::decode(b"i3eextra"),
            Err(BencodeError::TrailingData)
        );
    }

    #[test]
    fn find_top_level_dict_value_span_locates_nested_dict() {
        let data = b"d4:infod4:name3:fooee";
        let (start, end) = Bencode::find_top_level_dict_value_span(data, b"info").unwrap();
        assert_eq!(&data[start..end], b"d4:name3:fooe");
    }

    #[test]
    fn find_top_level_dict_value_span_missing_key() {
        let data = b"d3:fooi1ee";
        assert_eq!(
            Bencode::find_top_level_dict_value_span(data, b"info"),
            Err(BencodeError::InvalidBencodeDictKey)
        );
    }
}
