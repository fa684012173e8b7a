use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, macros::format_description};

use crate::error::ParseError;

/// Entry type character of a `ls -l` mode string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Regular,
    Directory,
    Symlink,
    BlockDevice,
    CharDevice,
    Fifo,
    Socket,
}

impl FileType {
    fn from_char(c: char) -> Option<Self> {
        match c {
            '-' => Some(Self::Regular),
            'd' => Some(Self::Directory),
            'l' => Some(Self::Symlink),
            'b' => Some(Self::BlockDevice),
            'c' => Some(Self::CharDevice),
            'p' => Some(Self::Fifo),
            's' => Some(Self::Socket),
            _ => None,
        }
    }
}

/// One parsed entry of a privileged `ls -bAll` directory listing.
///
/// Instances are transient: produced during enumeration, consumed by the
/// orchestrator, and persisted only as manifest records.
#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    /// Path relative to the listing base. Backslash escapes produced by
    /// `ls -b` (e.g. `\ ` for spaces) are preserved verbatim.
    pub file_path: String,
    pub file_type: FileType,
    /// Size in bytes.
    pub file_size: u64,
    /// Owner as reported, symbolic or numeric.
    pub owner: String,
    /// Group as reported, symbolic or numeric.
    pub group: String,
    /// 9-bit permission mask, bit 8 = owner read down to bit 0 = other execute.
    pub file_mode: u16,
    pub file_mod_time: OffsetDateTime,
}

impl FileInfo {
    /// Parses one line of `ls -bAll` output.
    ///
    /// Expected field layout:
    /// `<mode:10> <links> <owner> <group> <size> <date> <time.frac> <offset> <name...>`
    ///
    /// Fields may be separated by runs of spaces, so the fixed part is split
    /// on whitespace runs rather than single spaces. Everything after the
    /// offset is the file name; its tokens are rejoined with single spaces so
    /// that backslash-escaped spaces survive unmodified. If the name starts
    /// with `base_path`, that prefix is stripped.
    pub fn from_ls_output(line: &str, base_path: &str) -> Result<Self, ParseError> {
        let fail = |reason: &str| ParseError::new(line, reason);

        let mut fields = line.split_whitespace();
        let mode_str = fields.next().ok_or_else(|| fail("empty line"))?;
        let link_count = fields.next().ok_or_else(|| fail("missing link count"))?;
        let owner = fields.next().ok_or_else(|| fail("missing owner"))?;
        let group = fields.next().ok_or_else(|| fail("missing group"))?;
        let size = fields.next().ok_or_else(|| fail("missing size"))?;
        let date = fields.next().ok_or_else(|| fail("missing date"))?;
        let time_of_day = fields.next().ok_or_else(|| fail("missing time"))?;
        let offset = fields.next().ok_or_else(|| fail("missing UTC offset"))?;
        let name = fields.collect::<Vec<_>>().join(" ");
        if name.is_empty() {
            return Err(fail("missing file name"));
        }

        let (file_type, file_mode) = parse_mode(mode_str).map_err(|reason| fail(reason))?;
        link_count
            .parse::<u64>()
            .map_err(|_| fail("unparseable link count"))?;
        let file_size = size.parse::<u64>().map_err(|_| fail("unparseable size"))?;
        let file_mod_time = parse_mod_time(date, time_of_day, offset).map_err(|reason| fail(reason))?;

        let file_path = match name.strip_prefix(base_path).and_then(|rest| rest.strip_prefix('/')) {
            Some(relative) if !relative.is_empty() => relative.to_string(),
            _ => name,
        };

        Ok(Self {
            file_path,
            file_type,
            file_size,
            owner: owner.to_string(),
            group: group.to_string(),
            file_mode,
            file_mod_time,
        })
    }

    /// Permission mask rendered for `chmod`, e.g. `600`.
    pub fn mode_octal(&self) -> String {
        format!("{:03o}", self.file_mode)
    }

    /// Modification time as milliseconds since the Unix epoch.
    pub fn mod_time_millis(&self) -> i64 {
        (self.file_mod_time.unix_timestamp_nanos() / 1_000_000) as i64
    }
}

/// Maps a 10-character mode string to the entry type and a 9-bit permission
/// mask. The permission bit is set iff the character is not `-`; the setuid,
/// setgid and sticky variants (`s`, `S`, `t`, `T`) count as set.
fn parse_mode(mode_str: &str) -> Result<(FileType, u16), &'static str> {
    let chars: Vec<char> = mode_str.chars().collect();
    if chars.len() != 10 {
        return Err("mode string is not 10 characters");
    }
    let file_type = FileType::from_char(chars[0]).ok_or("unknown entry type character")?;
    let mut mask: u16 = 0;
    for (index, &c) in chars[1..10].iter().enumerate() {
        if !matches!(c, 'r' | 'w' | 'x' | 's' | 'S' | 't' | 'T' | '-') {
            return Err("unknown permission character");
        }
        if c != '-' {
            mask |= 1 << (8 - index);
        }
    }
    Ok((file_type, mask))
}

/// Undoes the backslash escaping `ls -b` applies to a file name, yielding the
/// literal on-disk name. `ls -b` escapes backslashes, spaces and
/// non-printables (C-style and octal); everything else passes through.
pub fn unescape_ls_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut chars = name.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('a') => out.push('\u{07}'),
            Some('b') => out.push('\u{08}'),
            Some('f') => out.push('\u{0c}'),
            Some('v') => out.push('\u{0b}'),
            Some(digit @ '0'..='7') => {
                let mut value = digit as u32 - '0' as u32;
                while let Some(&next @ '0'..='7') = chars.peek() {
                    if value >= 0o100 {
                        break;
                    }
                    value = value * 8 + (next as u32 - '0' as u32);
                    chars.next();
                }
                out.push(char::from_u32(value).unwrap_or('\u{fffd}'));
            }
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn parse_mod_time(
    date: &str,
    time_of_day: &str,
    offset: &str,
) -> Result<OffsetDateTime, &'static str> {
    let fmt = format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond] \
         [offset_hour sign:mandatory][offset_minute]"
    );
    let combined = format!("{date} {time_of_day} {offset}");
    OffsetDateTime::parse(&combined, &fmt).map_err(|_| "unparseable date/time/offset")
}
