use std::path::{Path, PathBuf};

/// Per-player file kinds, each under its own directory tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Record,
    Objects,
    Text,
    ScriptVars,
}

pub const FILE_KINDS: [FileKind; 4] = [
    FileKind::Record,
    FileKind::Objects,
    FileKind::Text,
    FileKind::ScriptVars,
];

impl FileKind {
    pub fn dir(self) -> &'static str {
        match self {
            FileKind::Record => "plrfiles",
            FileKind::Objects => "plrobjs",
            FileKind::Text => "plrtext",
            FileKind::ScriptVars => "plrvars",
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            FileKind::Record => "plr",
            FileKind::Objects => "objs",
            FileKind::Text => "text",
            FileKind::ScriptVars => "mem",
        }
    }
}

pub fn bucket_for(name: &str) -> &'static str {
    match name.chars().next().map(|c| c.to_ascii_lowercase()) {
        Some('a'..='e') => "A-E",
        Some('f'..='j') => "F-J",
        Some('k'..='o') => "K-O",
        Some('p'..='t') => "P-T",
        Some('u'..='z') => "U-Z",
        _ => "ZZZ",
    }
}

/// Relative path of a player's record file.
pub fn path_for(name: &str) -> Option<PathBuf> {
    path_for_kind(name, FileKind::Record)
}

pub fn path_for_kind(name: &str, kind: FileKind) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }
    let file = format!("{}.{}", name.to_ascii_lowercase(), kind.suffix());
    Some(
        Path::new(kind.dir())
            .join(bucket_for(name))
            .join(file),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_span_the_alphabet() {
        assert_eq!(bucket_for("aldric"), "A-E");
        assert_eq!(bucket_for("Egon"), "A-E");
        assert_eq!(bucket_for("fenwick"), "F-J");
        assert_eq!(bucket_for("Kara"), "K-O");
        assert_eq!(bucket_for("tam"), "P-T");
        assert_eq!(bucket_for("Zed"), "U-Z");
        assert_eq!(bucket_for("9lives"), "ZZZ");
    }

    #[test]
    fn paths_ignore_case() {
        assert_eq!(path_for("Aldric"), path_for("aLDRIC"));
        assert_eq!(
            path_for("Aldric"),
            Some(PathBuf::from("plrfiles/A-E/aldric.plr"))
        );
        assert_eq!(
            path_for_kind("Uma", FileKind::ScriptVars),
            Some(PathBuf::from("plrvars/U-Z/uma.mem"))
        );
        assert_eq!(path_for(""), None);
    }
}
