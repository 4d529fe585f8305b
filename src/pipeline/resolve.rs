//! Placeholder resolution: swap `[artifact:<id>]` lines for image references.

use crate::artifact::{ArtifactKind, ArtifactMap};
use std::collections::HashMap;

/// The id named by a placeholder line, if `line` is one.
fn placeholder_id(line: &str) -> Option<&str> {
    let id = line.trim().strip_prefix("[artifact:")?.strip_suffix(']')?;
    (!id.is_empty()).then_some(id)
}

/// Replace every placeholder line in `text`.
///
/// `assets` maps artifact id to the asset file name, relative to the
/// directory the typesetter resolves images from. Unknown ids are left as
/// they are; all other lines pass through untouched.
pub fn resolve(text: &str, artifacts: &ArtifactMap, assets: &HashMap<String, String>) -> String {
    text.split('\n')
        .map(|line| {
            let Some(artifact) = placeholder_id(line).and_then(|id| artifacts.get(id)) else {
                return line.to_string();
            };
            let title = &artifact.title;
            match (&artifact.kind, assets.get(&artifact.id)) {
                (ArtifactKind::Unsupported(declared), _) => {
                    format!("*{title} (unsupported artifact type: {declared})*")
                }
                (_, Some(file)) => format!("![{title}]({file})\n\n*{title}*"),
                (_, None) => format!("*{title} (rendering unavailable)*"),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::Artifact;

    fn map() -> ArtifactMap {
        let mut m = ArtifactMap::new();
        for (id, kind) in [
            ("chart", ArtifactKind::VectorImage),
            ("flow", ArtifactKind::Diagram),
            ("page", ArtifactKind::Unsupported("text/html".into())),
        ] {
            m.insert(Artifact {
                id: id.into(),
                version: "1".into(),
                kind,
                title: format!("{id} title"),
                content: String::new(),
            });
        }
        m
    }

    #[test]
    fn asset_becomes_image_and_caption() {
        let assets = HashMap::from([("chart".to_string(), "chart.png".to_string())]);
        let out = resolve("intro\n\n[artifact:chart]\n\nend", &map(), &assets);
        assert_eq!(out, "intro\n\n![chart title](chart.png)\n\n*chart title*\n\nend");
    }

    #[test]
    fn unsupported_and_missing_assets_get_notes() {
        let out = resolve("[artifact:page]\n  [artifact:flow]  ", &map(), &HashMap::new());
        assert_eq!(
            out,
            "*page title (unsupported artifact type: text/html)*\n*flow title (rendering unavailable)*"
        );
    }

    #[test]
    fn unknown_ids_and_inline_mentions_untouched() {
        let text = "[artifact:ghost]\nsee [artifact:chart] inline\n[artifact:]";
        let assets = HashMap::from([("chart".to_string(), "chart.png".to_string())]);
        assert_eq!(resolve(text, &map(), &assets), text);
    }

    #[test]
    fn preserves_trailing_newline() {
        assert_eq!(resolve("a\n", &map(), &HashMap::new()), "a\n");
    }
}
