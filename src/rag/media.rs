//! Choosing which image and video references accompany an answer.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::store::Chunk;

/// Which selection rule produced the media of an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaBranch {
    /// No retrieved chunk carries media.
    NoMedia,
    /// Visual question: media of every retrieved chunk.
    VisualUnion,
    /// No retrieved chunk has usable text: media of every retrieved chunk.
    TextlessUnion,
    /// Non-visual question: media of the leading media chunks only.
    LeadingMediaChunks,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSelection {
    pub images: Vec<String>,
    pub videos: Vec<String>,
    pub branch: MediaBranch,
}

/// Select media from `chunks` (in rank order).
///
/// Rules, first match wins:
/// 1. no chunk has media: nothing;
/// 2. visual question: union over all chunks;
/// 3. no chunk has non-blank text: union over all chunks;
/// 4. otherwise: union over the first `max_media_chunks` chunks that have media.
///
/// Rule 3 must run before rule 4: checked after the cap it could never
/// match, since the cap branch accepts every non-visual question.
///
/// Each chunk contributes its images then its videos; both lists are
/// de-duplicated keeping first occurrence.
pub fn select_media(chunks: &[&Chunk], is_visual: bool, max_media_chunks: usize) -> MediaSelection {
    let media_chunks: Vec<&Chunk> = chunks.iter().copied().filter(|c| c.has_media()).collect();

    if media_chunks.is_empty() {
        return MediaSelection {
            images: Vec::new(),
            videos: Vec::new(),
            branch: MediaBranch::NoMedia,
        };
    }

    let (sources, branch): (Vec<&Chunk>, MediaBranch) = if is_visual {
        (chunks.to_vec(), MediaBranch::VisualUnion)
    } else if !chunks.iter().any(|c| c.has_usable_text()) {
        (chunks.to_vec(), MediaBranch::TextlessUnion)
    } else {
        (
            media_chunks.into_iter().take(max_media_chunks).collect(),
            MediaBranch::LeadingMediaChunks,
        )
    };

    let images = dedup_preserving_order(sources.iter().flat_map(|c| c.images.iter().cloned()));
    let videos = dedup_preserving_order(sources.iter().flat_map(|c| c.videos.iter().cloned()));

    MediaSelection {
        images,
        videos,
        branch,
    }
}

/// Drop repeated items, keeping the first occurrence of each.
pub fn dedup_preserving_order<I>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}
