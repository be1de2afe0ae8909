//! GD3 tag block attached to VGM files.

use super::reader::ByteView;

const GD3_MAGIC: &[u8; 4] = b"Gd3 ";
const GD3_FIELD_COUNT: usize = 11;

/// Track metadata stored as NUL-terminated UTF-16LE strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Gd3Tags {
    /// Track name (English).
    pub track_name: String,
    /// Track name (Japanese).
    pub track_name_jp: String,
    /// Game name (English).
    pub game_name: String,
    /// Game name (Japanese).
    pub game_name_jp: String,
    /// System name (English).
    pub system_name: String,
    /// System name (Japanese).
    pub system_name_jp: String,
    /// Original author (English).
    pub author: String,
    /// Original author (Japanese).
    pub author_jp: String,
    /// Release date.
    pub release_date: String,
    /// Person who ripped the file.
    pub ripper: String,
    /// Free-form notes.
    pub notes: String,
}

/// Parse the tag block at absolute `offset`. Returns `None` for missing or malformed tags.
pub fn parse_gd3(data: &[u8], offset: usize) -> Option<Gd3Tags> {
    let view = ByteView::new(data);
    if view.slice(offset, 4)? != GD3_MAGIC {
        return None;
    }
    let length = view.u32_at(offset + 8)? as usize;
    let body = view.slice(offset + 12, length)?;

    let mut fields = body
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect::<Vec<_>>()
        .split(|&unit| unit == 0)
        .map(|units| {
            char::decode_utf16(units.iter().copied())
                .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect::<String>()
        })
        .take(GD3_FIELD_COUNT)
        .collect::<Vec<_>>();
    if fields.len() < GD3_FIELD_COUNT {
        fields.resize(GD3_FIELD_COUNT, String::new());
    }

    let mut fields = fields.into_iter();
    let mut next = || fields.next().unwrap_or_default();
    Some(Gd3Tags {
        track_name: next(),
        track_name_jp: next(),
        game_name: next(),
        game_name_jp: next(),
        system_name: next(),
        system_name_jp: next(),
        author: next(),
        author_jp: next(),
        release_date: next(),
        ripper: next(),
        notes: next(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(strings: &[&str]) -> Vec<u8> {
        let mut body = Vec::new();
        for s in strings {
            for unit in s.encode_utf16() {
                body.extend_from_slice(&unit.to_le_bytes());
            }
            body.extend_from_slice(&[0, 0]);
        }
        let mut block = Vec::new();
        block.extend_from_slice(b"Gd3 ");
        block.extend_from_slice(&0x100u32.to_le_bytes());
        block.extend_from_slice(&(body.len() as u32).to_le_bytes());
        block.extend_from_slice(&body);
        block
    }

    #[test]
    fn parses_all_fields() {
        let mut data = vec![0xAAu8; 8];
        data.extend(encode(&[
            "Green Hill",
            "グリーンヒル",
            "Sonic",
            "",
            "Master System",
            "",
            "Masato Nakamura",
            "",
            "1991",
            "someone",
            "notes",
        ]));
        let tags = parse_gd3(&data, 8).unwrap();
        assert_eq!(tags.track_name, "Green Hill");
        assert_eq!(tags.track_name_jp, "グリーンヒル");
        assert_eq!(tags.system_name, "Master System");
        assert_eq!(tags.author, "Masato Nakamura");
        assert_eq!(tags.notes, "notes");
    }

    #[test]
    fn short_tag_list_fills_blanks() {
        let data = encode(&["Only title"]);
        let tags = parse_gd3(&data, 0).unwrap();
        assert_eq!(tags.track_name, "Only title");
        assert_eq!(tags.author, "");
    }

    #[test]
    fn malformed_blocks_are_ignored() {
        assert!(parse_gd3(b"Gd3 ", 0).is_none());
        assert!(parse_gd3(b"Xd3 \x00\x01\x00\x00\x00\x00\x00\x00", 0).is_none());
        let mut data = encode(&["x"]);
        data.truncate(data.len() - 1);
        assert!(parse_gd3(&data, 0).is_none());
    }
}
