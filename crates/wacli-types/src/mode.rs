use std::fmt;
use std::str::FromStr;

use crate::error::ResourceError;

/// Whether a stream carries text (UTF-8) or raw bytes.
///
/// The kind is declared when a stream is opened, so a copy between two
/// streams knows up front whether it has to transcode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Text,
    Binary,
}

/// The four modes a resource handle can be opened in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpenMode {
    /// `r`
    ReadText,
    /// `rb`
    ReadBinary,
    /// `w`
    WriteText,
    /// `wb`
    WriteBinary,
}

impl OpenMode {
    /// All supported modes, in canonical order.
    pub const ALL: [OpenMode; 4] = [
        OpenMode::ReadText,
        OpenMode::ReadBinary,
        OpenMode::WriteText,
        OpenMode::WriteBinary,
    ];

    /// Textual form (`r`, `rb`, `w`, `wb`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadText => "r",
            Self::ReadBinary => "rb",
            Self::WriteText => "w",
            Self::WriteBinary => "wb",
        }
    }

    pub fn is_read(&self) -> bool {
        matches!(self, Self::ReadText | Self::ReadBinary)
    }

    pub fn is_write(&self) -> bool {
        !self.is_read()
    }

    /// The stream kind a handle opened in this mode produces.
    pub fn kind(&self) -> StreamKind {
        match self {
            Self::ReadText | Self::WriteText => StreamKind::Text,
            Self::ReadBinary | Self::WriteBinary => StreamKind::Binary,
        }
    }

    pub fn read(kind: StreamKind) -> Self {
        match kind {
            StreamKind::Text => Self::ReadText,
            StreamKind::Binary => Self::ReadBinary,
        }
    }

    pub fn write(kind: StreamKind) -> Self {
        match kind {
            StreamKind::Text => Self::WriteText,
            StreamKind::Binary => Self::WriteBinary,
        }
    }

    /// The read mode with the same stream kind.
    pub fn as_read(&self) -> Self {
        Self::read(self.kind())
    }

    /// The write mode with the same stream kind.
    pub fn as_write(&self) -> Self {
        Self::write(self.kind())
    }
}

impl Default for OpenMode {
    fn default() -> Self {
        Self::ReadText
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpenMode {
    type Err = ResourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "r" => Ok(Self::ReadText),
            "rb" => Ok(Self::ReadBinary),
            "w" => Ok(Self::WriteText),
            "wb" => Ok(Self::WriteBinary),
            other => Err(ResourceError::UnsupportedMode(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_all_modes() {
        for mode in OpenMode::ALL {
            assert_eq!(mode.as_str().parse::<OpenMode>().unwrap(), mode);
        }
    }

    #[test]
    fn unknown_mode_is_rejected() {
        for bad in ["a", "r+", "", "wt", "RB"] {
            let err = bad.parse::<OpenMode>().unwrap_err();
            assert!(matches!(err, ResourceError::UnsupportedMode(ref m) if m == bad));
        }
    }

    #[test]
    fn direction_and_kind() {
        assert!(OpenMode::ReadBinary.is_read());
        assert!(OpenMode::WriteText.is_write());
        assert_eq!(OpenMode::WriteText.kind(), StreamKind::Text);
        assert_eq!(OpenMode::ReadBinary.as_write(), OpenMode::WriteBinary);
        assert_eq!(OpenMode::WriteText.as_read(), OpenMode::ReadText);
    }
}
