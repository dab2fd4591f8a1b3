use redb::TypeName;
pub use v1 as latest_clip;

pub mod v1;

pub trait ClipVariant {
    const VERSION: u8;
}

#[derive(Debug, Clone)]
pub enum VersionedClip {
    V1(v1::Clip),
}

impl VersionedClip {
    pub fn into_latest(self) -> latest_clip::Clip {
        match self {
            VersionedClip::V1(clip) => clip,
        }
    }
}

impl redb::Value for VersionedClip {
    type SelfType<'a> = VersionedClip;
    type AsBytes<'a> = Vec<u8>;

    fn fixed_width() -> Option<usize> {
        None
    }

    fn from_bytes<'a>(data: &'a [u8]) -> Self::SelfType<'a>
    where
        Self: 'a,
    {
        let (version, data) = data.split_first().expect("empty clip record");
        match *version {
            v1::Clip::VERSION => {
                let v1 = postcard::from_bytes::<v1::Clip>(data).expect("invalid clip record");
                VersionedClip::V1(v1)
            }
            version => panic!("unsupported clip record version: {}", version),
        }
    }

    fn as_bytes<'a, 'b: 'a>(value: &'a Self::SelfType<'b>) -> Self::AsBytes<'a>
    where
        Self: 'b,
    {
        match value {
            VersionedClip::V1(v1) => {
                postcard::to_extend(v1, vec![v1::Clip::VERSION]).expect("clip record encodes")
            }
        }
    }

    fn type_name() -> TypeName {
        TypeName::new("clipshelf::Clip")
    }
}
