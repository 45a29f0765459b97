//! Location strings.
//!
//! The shell reports a location either as a filesystem path, a `file:` URL, or a
//! `shell:::{GUID}` moniker for virtual folders. Everything that compares or
//! stores a location goes through [`normalize_location`] first.

use crate::error::{ShellTabError, ShellTabResult};
use url::Url;

/// Control Panel (category view)
pub const CONTROL_PANEL: &str = "{26EE0668-A00A-44D7-9371-BEB064C98683}";
/// Control Panel (classic view)
pub const CONTROL_PANEL_CLASSIC: &str = "{21EC2020-3AEA-1069-A2DD-08002B30309D}";
pub const THIS_PC: &str = "{20D04FE0-3AEA-1069-A2D8-08002B30309D}";
pub const HOME: &str = "{F874310E-B6B7-47DC-BC84-B9E6B38F5903}";
pub const RECYCLE_BIN: &str = "{645FF040-5081-101B-9F08-00AA002F954E}";

const SHELL_PREFIX: &str = "shell:::";

const RESERVED: [&str; 2] = [CONTROL_PANEL, CONTROL_PANEL_CLASSIC];

const FRIENDLY_NAMES: [(&str, &str); 5] = [
    ("this pc", THIS_PC),
    ("computer", THIS_PC),
    ("home", HOME),
    ("control panel", CONTROL_PANEL),
    ("recycle bin", RECYCLE_BIN),
];

/// Bring a user- or shell-supplied location into canonical form.
///
/// Trims quotes and whitespace, expands `%VAR%`, maps friendly names of
/// well-known folders, decodes `file:` URLs and rewrites `{GUID}` and
/// `::{GUID}` into `shell:::{GUID}`. An empty input stays empty.
pub fn normalize_location(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('"').trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let expanded = expand_env_vars(trimmed);

    let lowered = expanded.to_ascii_lowercase();
    if let Some((_, guid)) = FRIENDLY_NAMES.iter().find(|(name, _)| *name == lowered) {
        return format!("{SHELL_PREFIX}{guid}");
    }

    if lowered.starts_with("file:") {
        match file_url_to_path(&expanded) {
            Ok(path) => return path,
            Err(e) => log::debug!("Keeping undecodable file URL {expanded}: {e}"),
        }
    }

    normalize_guid_form(&expanded)
}

/// `{GUID}`, `::{GUID}` and `shell:::{guid}` all become `shell:::{GUID}` with
/// the GUID upper-cased. Anything after the GUID is kept.
fn normalize_guid_form(location: &str) -> String {
    let rest = if is_virtual(location) {
        &location[SHELL_PREFIX.len()..]
    } else if let Some(rest) = location.strip_prefix("::") {
        rest
    } else {
        location
    };

    match split_guid(rest) {
        Some((guid, tail)) => format!("{SHELL_PREFIX}{}{tail}", guid.to_ascii_uppercase()),
        None => location.to_string(),
    }
}

/// Split a leading `{8-4-4-4-12}` GUID off `s`.
fn split_guid(s: &str) -> Option<(&str, &str)> {
    const GUID_LEN: usize = 38;
    if s.len() < GUID_LEN || !s.is_char_boundary(GUID_LEN) {
        return None;
    }
    let (guid, tail) = s.split_at(GUID_LEN);
    is_guid(guid).then_some((guid, tail))
}

fn is_guid(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.len() != 38 || bytes[0] != b'{' || bytes[37] != b'}' {
        return false;
    }
    bytes[1..37].iter().enumerate().all(|(i, b)| match i {
        8 | 13 | 18 | 23 => *b == b'-',
        _ => b.is_ascii_hexdigit(),
    })
}

/// Expand `%NAME%` references from the process environment. Unknown variables
/// and unmatched `%` are left as written.
pub fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find('%') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('%') {
            Some(end) if end > 0 => {
                let name = &after[..end];
                match std::env::var(name) {
                    Ok(value) => out.push_str(&value),
                    Err(_) => {
                        out.push('%');
                        out.push_str(name);
                        out.push('%');
                    }
                }
                rest = &after[end + 1..];
            }
            _ => {
                out.push('%');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Decode a `file:` URL into a Windows path. A host becomes a UNC prefix.
pub fn file_url_to_path(input: &str) -> ShellTabResult<String> {
    let url = Url::parse(input).map_err(|e| ShellTabError::location(format!("{input}: {e}")))?;
    if url.scheme() != "file" {
        return Err(ShellTabError::location(format!("not a file URL: {input}")));
    }

    let decoded = urlencoding::decode(url.path())
        .map_err(|e| ShellTabError::location(format!("{input}: {e}")))?;
    let path = decoded.replace('/', "\\");

    let path = match url.host_str().filter(|h| !h.is_empty()) {
        Some(host) => format!("\\\\{host}{path}"),
        None => {
            // "\C:\dir" -> "C:\dir"
            let bytes = path.as_bytes();
            if bytes.len() >= 3 && bytes[0] == b'\\' && bytes[1].is_ascii_alphabetic() && bytes[2] == b':' {
                path[1..].to_string()
            } else {
                path
            }
        }
    };

    Ok(path)
}

/// Locations the watcher never tracks (Control Panel).
pub fn is_reserved(location: &str) -> bool {
    let upper = location.to_ascii_uppercase();
    RESERVED.iter().any(|guid| upper.contains(guid))
}

/// `shell:::` monikers have no filesystem path.
pub fn is_virtual(location: &str) -> bool {
    location
        .get(..SHELL_PREFIX.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(SHELL_PREFIX))
}

/// Case-insensitive comparison that ignores separator style and a trailing
/// separator (except on a drive root).
pub fn locations_equivalent(a: &str, b: &str) -> bool {
    let a = comparable(&normalize_location(a));
    let b = comparable(&normalize_location(b));
    !a.is_empty() && a == b
}

fn comparable(location: &str) -> String {
    let mut s = location.replace('/', "\\").to_lowercase();
    while s.ends_with('\\') && !is_drive_root(&s) {
        s.pop();
    }
    if s.len() == 2 && s.as_bytes()[1] == b':' {
        s.push('\\');
    }
    s
}

fn is_drive_root(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == 3 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && bytes[2] == b'\\'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trims_quotes_and_whitespace() {
        assert_eq!(normalize_location("  \"C:\\Users\"  "), "C:\\Users");
        assert_eq!(normalize_location("   "), "");
    }

    #[test]
    fn test_guid_forms() {
        let expected = format!("shell:::{THIS_PC}");
        assert_eq!(normalize_location(THIS_PC), expected);
        assert_eq!(normalize_location(&format!("::{THIS_PC}")), expected);
        assert_eq!(
            normalize_location(&format!("SHELL:::{}", THIS_PC.to_lowercase())),
            expected
        );
        assert_eq!(
            normalize_location(&format!("::{CONTROL_PANEL}\\0\\Sub")),
            format!("shell:::{CONTROL_PANEL}\\0\\Sub")
        );
        assert_eq!(normalize_location("{not-a-guid}"), "{not-a-guid}");
    }

    #[test]
    fn test_friendly_names() {
        assert_eq!(normalize_location("This PC"), format!("shell:::{THIS_PC}"));
        assert_eq!(normalize_location("control panel"), format!("shell:::{CONTROL_PANEL}"));
    }

    #[test]
    fn test_env_expansion() {
        std::env::set_var("SHELLTAB_TEST_DIR", "C:\\Data");
        assert_eq!(expand_env_vars("%SHELLTAB_TEST_DIR%\\sub"), "C:\\Data\\sub");
        assert_eq!(
            expand_env_vars("%SHELLTAB_SURELY_UNSET_VAR%\\x"),
            "%SHELLTAB_SURELY_UNSET_VAR%\\x"
        );
        assert_eq!(expand_env_vars("100% done"), "100% done");
        assert_eq!(expand_env_vars("%%"), "%%");
    }

    #[test]
    fn test_file_urls() {
        assert_eq!(
            normalize_location("file:///C:/Program%20Files/App"),
            "C:\\Program Files\\App"
        );
        assert_eq!(
            file_url_to_path("file://server/share/dir").unwrap(),
            "\\\\server\\share\\dir"
        );
        assert!(file_url_to_path("https://example.com").is_err());
    }

    #[test]
    fn test_reserved_and_virtual() {
        assert!(is_reserved(&normalize_location(CONTROL_PANEL)));
        assert!(is_reserved(&format!("shell:::{}", CONTROL_PANEL_CLASSIC.to_lowercase())));
        assert!(!is_reserved("C:\\Windows"));
        assert!(is_virtual(&normalize_location(RECYCLE_BIN)));
        assert!(!is_virtual("C:\\"));
    }

    #[test]
    fn test_equivalence() {
        assert!(locations_equivalent("C:\\Users\\", "c:/users"));
        assert!(locations_equivalent("C:", "c:\\"));
        assert!(locations_equivalent("This PC", &format!("::{THIS_PC}")));
        assert!(!locations_equivalent("C:\\A", "C:\\B"));
        assert!(!locations_equivalent("", ""));
    }
}
