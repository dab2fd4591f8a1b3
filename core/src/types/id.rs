use nutype::nutype;
use redb::TypeName;
use std::cmp::Ordering;
use std::str;
use std::time::SystemTime;
use uuid::Uuid;

use super::epoch_millis;

pub const MAX_ID_LENGTH: usize = 128;

/// Ids double as file names in the blob namespace, so only a portable subset is allowed.
fn is_portable_id(s: &str) -> bool {
    s != "."
        && s != ".."
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn random_suffix() -> String {
    let mut suffix = Uuid::new_v4().simple().to_string();
    suffix.truncate(9);
    suffix
}

/// Primary key of a clip record.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = MAX_ID_LENGTH, predicate = |s: &str| is_portable_id(s)),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        AsRef,
        Deref,
        TryFrom,
        Into,
        Hash,
        Borrow,
        Display,
        Serialize,
        Deserialize,
    )
)]
pub struct ClipId(String);

impl ClipId {
    /// Generates `clip_<epoch millis>_<random>`.
    pub fn generate(now: SystemTime) -> Self {
        let id = format!("clip_{}_{}", epoch_millis(now), random_suffix());
        Self::try_new(id).expect("generated clip id is always valid")
    }
}

/// Identifier of a binary object; the `pdfId` of a clip record.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = MAX_ID_LENGTH, predicate = |s: &str| is_portable_id(s)),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        AsRef,
        Deref,
        TryFrom,
        Into,
        Hash,
        Borrow,
        Display,
        Serialize,
        Deserialize,
    )
)]
pub struct BlobId(String);

impl BlobId {
    /// Generates `pdf_<epoch millis>_<random>`.
    pub fn generate(now: SystemTime) -> Self {
        let id = format!("pdf_{}_{}", epoch_millis(now), random_suffix());
        Self::try_new(id).expect("generated blob id is always valid")
    }
}

impl redb::Key for ClipId {
    fn compare(data1: &[u8], data2: &[u8]) -> Ordering {
        let s1 = str::from_utf8(data1).expect("invalid UTF-8 in clip id");
        let s2 = str::from_utf8(data2).expect("invalid UTF-8 in clip id");

        s1.cmp(s2)
    }
}

impl redb::Value for ClipId {
    type SelfType<'a> = Self;
    type AsBytes<'a> = &'a [u8];

    fn fixed_width() -> Option<usize> {
        None
    }

    fn from_bytes<'a>(data: &'a [u8]) -> Self::SelfType<'a>
    where
        Self: 'a,
    {
        let s = str::from_utf8(data).expect("invalid UTF-8 in clip id");
        Self::try_from(s).expect("stored clip id is valid")
    }

    fn as_bytes<'a, 'b: 'a>(value: &'a Self::SelfType<'b>) -> Self::AsBytes<'a>
    where
        Self: 'b,
    {
        value.as_bytes()
    }

    fn type_name() -> TypeName {
        TypeName::new("clipshelf::ClipId")
    }
}
