use crate::types::{ClipId, EpochMillis};
use redb::TypeName;
use std::cmp::Ordering;

/// Index entry ordering clips by creation time, ties broken by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedKey {
    pub created_at: EpochMillis,
    pub id: ClipId,
}

fn split_created_at(data: &[u8]) -> (EpochMillis, &[u8]) {
    let (millis, rest) = data
        .split_first_chunk::<8>()
        .expect("created index key shorter than timestamp");
    (u64::from_be_bytes(*millis), rest)
}

impl redb::Key for CreatedKey {
    fn compare(data1: &[u8], data2: &[u8]) -> Ordering {
        let (created1, id1) = split_created_at(data1);
        let (created2, id2) = split_created_at(data2);

        created1
            .cmp(&created2)
            .then_with(|| <ClipId as redb::Key>::compare(id1, id2))
    }
}

impl redb::Value for CreatedKey {
    type SelfType<'a> = CreatedKey;
    type AsBytes<'a> = Vec<u8>;

    fn fixed_width() -> Option<usize> {
        None
    }

    fn from_bytes<'a>(data: &'a [u8]) -> Self::SelfType<'a>
    where
        Self: 'a,
    {
        let (created_at, id) = split_created_at(data);
        CreatedKey {
            created_at,
            id: <ClipId as redb::Value>::from_bytes(id),
        }
    }

    fn as_bytes<'a, 'b: 'a>(value: &'a Self::SelfType<'b>) -> Self::AsBytes<'a>
    where
        Self: 'b,
    {
        let mut bytes = Vec::with_capacity(8 + value.id.len());
        bytes.extend_from_slice(&value.created_at.to_be_bytes());
        bytes.extend_from_slice(<ClipId as redb::Value>::as_bytes(&value.id));
        bytes
    }

    fn type_name() -> TypeName {
        TypeName::new("clipshelf::CreatedKey")
    }
}
