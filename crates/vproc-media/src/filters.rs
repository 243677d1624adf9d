//! FFmpeg filter builders.

use std::fmt::Write;
use std::path::Path;

use vproc_models::JobConfig;

/// Audio noise reduction filter used by the noise clean pass.
pub const DENOISE_FILTER: &str = "afftdn=nf=-25";

/// `scale` for optional dimensions. A missing side keeps the aspect ratio.
pub fn scale_filter(width: Option<u32>, height: Option<u32>) -> Option<String> {
    match (width, height) {
        (None, None) => None,
        (w, h) => Some(format!("scale={}:{}", side(w), side(h))),
    }
}

/// `fps` for an explicit frame rate.
pub fn fps_filter(fps: Option<u32>) -> Option<String> {
    fps.map(|fps| format!("fps={}", fps))
}

/// Video filter chain for a single-input encode, `None` when nothing changes.
pub fn encode_filter_chain(config: &JobConfig) -> Option<String> {
    let parts: Vec<String> = [
        scale_filter(config.width, config.height),
        fps_filter(config.frame_rate.fps()),
    ]
    .into_iter()
    .flatten()
    .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(","))
    }
}

/// Thumbnail scale. Zero is treated like an absent side.
pub fn thumbnail_scale(width: Option<u32>, height: Option<u32>) -> Option<String> {
    scale_filter(width.filter(|w| *w > 0), height.filter(|h| *h > 0))
}

/// Filter graph joining `inputs` files into `[outv]` (and `[outa]` when
/// `with_audio`), each letterboxed to `width`x`height`.
pub fn merge_filter_graph(
    inputs: usize,
    width: u32,
    height: u32,
    fps: Option<u32>,
    with_audio: bool,
) -> String {
    let mut graph = String::new();

    for i in 0..inputs {
        let _ = write!(
            graph,
            "[{i}:v]scale={width}:{height}:force_original_aspect_ratio=decrease,\
             pad={width}:{height}:(ow-iw)/2:(oh-ih)/2,setsar=1"
        );
        if let Some(fps) = fps {
            let _ = write!(graph, ",fps={fps}");
        }
        let _ = write!(graph, "[v{i}];");
    }

    for i in 0..inputs {
        let _ = write!(graph, "[v{i}]");
        if with_audio {
            let _ = write!(graph, "[{i}:a]");
        }
    }

    let _ = write!(
        graph,
        "concat=n={inputs}:v=1:a={}[outv]",
        if with_audio { 1 } else { 0 }
    );
    if with_audio {
        graph.push_str("[outa]");
    }

    graph
}

/// Contents of a concat demuxer list file.
///
/// The demuxer resolves relative entries against the list file's own
/// directory, so relative inputs are anchored to `base` here.
pub fn concat_list<P: AsRef<Path>>(inputs: &[P], base: &Path) -> String {
    inputs
        .iter()
        .map(|p| {
            let path = base.join(p.as_ref());
            let escaped = path.to_string_lossy().replace('\'', r"'\''");
            format!("file '{}'\n", escaped)
        })
        .collect()
}

// Even dimension that preserves aspect ratio
fn side(value: Option<u32>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-2".to_string())
}
