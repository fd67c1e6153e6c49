//! Recoverable conditions reported while processing continues.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataWarning {
    /// The stream ended without an EOI marker; the end was treated as EOI.
    ImplicitEndOfImage,
    /// A JFIF header inside a JPEG-compressed thumbnail was skipped.
    JfifInThumbnailIgnored,
    /// An embedded ICC profile could not be used and was dropped.
    IccProfileDropped { reason: String },
    /// A thumbnail exceeded 255x255 and was clipped to this size.
    ThumbnailClipped { width: u32, height: u32 },
    /// An Adobe marker incompatible with a forced JFIF header was not written.
    MetadataAdjustedForThumbnail,
    /// An explicit destination layout was ignored in favour of the image layout.
    DestinationTypeIgnored,
}

impl fmt::Display for MetadataWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ImplicitEndOfImage => write!(f, "premature end of stream, treated as EOI"),
            Self::JfifInThumbnailIgnored => {
                write!(f, "JFIF marker inside a JPEG thumbnail ignored")
            }
            Self::IccProfileDropped { reason } => write!(f, "ICC profile dropped: {}", reason),
            Self::ThumbnailClipped { width, height } => {
                write!(f, "thumbnail clipped to {}x{}", width, height)
            }
            Self::MetadataAdjustedForThumbnail => {
                write!(f, "Adobe marker omitted, incompatible with JFIF")
            }
            Self::DestinationTypeIgnored => write!(f, "destination type ignored"),
        }
    }
}

/// Receives recoverable warnings.
pub trait WarningSink {
    fn warning(&mut self, warning: MetadataWarning);
}

/// Keeps every warning, in order.
#[derive(Debug, Default)]
pub struct CollectWarnings {
    pub warnings: Vec<MetadataWarning>,
}

impl WarningSink for CollectWarnings {
    fn warning(&mut self, warning: MetadataWarning) {
        tracing::warn!(%warning, "metadata warning");
        self.warnings.push(warning);
    }
}

/// Only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogWarnings;

impl WarningSink for LogWarnings {
    fn warning(&mut self, warning: MetadataWarning) {
        tracing::warn!(%warning, "metadata warning");
    }
}

impl<S: WarningSink + ?Sized> WarningSink for &mut S {
    fn warning(&mut self, warning: MetadataWarning) {
        (**self).warning(warning);
    }
}
