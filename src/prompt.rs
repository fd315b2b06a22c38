//! Prompt construction for one set of segments.

use std::fmt::Write;

use crate::model::{ContentRating, ContentStyle, GenerationRequest, SetPlan, StoryMetadata};

/// Opening instruction for `style`. The `narration` field is only listed
/// when every segment of the set should carry one.
fn style_guidance(style: ContentStyle, narration: bool) -> String {
    let (intro, unit, mut fields, narrated) = match style {
        ContentStyle::Story => (
            "Write an engaging short story told in vivid, self-contained segments.",
            "segment",
            vec!["a `scene_description`"],
            true,
        ),
        ContentStyle::Movie => (
            "Write a movie script broken into scenes.",
            "scene",
            vec!["a `location`", "a `scene_description` of what the camera shows"],
            true,
        ),
        ContentStyle::Meme => (
            "Write a funny meme sequence.",
            "panel",
            vec!["an `image_prompt` describing the visual", "a short punchy `caption`"],
            false,
        ),
        ContentStyle::Anime => (
            "Write an anime episode told in scenes.",
            "scene",
            vec!["an `image_prompt` in anime art style", "a `scene_description`"],
            true,
        ),
    };
    if narrated && narration {
        fields.push("a `narration`");
    }
    let listed = match fields.split_last() {
        Some((last, rest)) if !rest.is_empty() => format!("{} and {}", rest.join(", "), last),
        Some((last, _)) => last.to_string(),
        None => String::new(),
    };
    format!("{} Each {} needs {}.", intro, unit, listed)
}

fn rating_guidance(rating: ContentRating) -> &'static str {
    match rating {
        ContentRating::Universal => "Keep everything suitable for all ages.",
        ContentRating::ParentalGuidance => {
            "Mild peril and humour are fine; nothing graphic. Suitable with parental guidance."
        }
        ContentRating::Adult => "Mature themes are allowed, but no explicit or hateful content.",
    }
}

fn narration_rules(request: &GenerationRequest, plan: &SetPlan) -> Option<String> {
    if request.no_narration {
        return Some("Do not include any `narration` field.".to_string());
    }
    if request.narration_only_first {
        return Some(if plan.start_segment == 1 {
            "Only segment 1 gets a `narration`; leave it out of every other segment.".to_string()
        } else {
            "Do not include any `narration` field in these segments.".to_string()
        });
    }
    None
}

fn write_roster(out: &mut String, heading: &str, characters: &[crate::model::Character]) {
    if characters.is_empty() {
        return;
    }
    let _ = writeln!(out, "{}", heading);
    for c in characters {
        let _ = write!(out, "- {}", c.name);
        if let Some(role) = &c.role {
            let _ = write!(out, " ({})", role);
        }
        if let Some(desc) = &c.description {
            let _ = write!(out, ": {}", desc);
        }
        out.push('\n');
    }
}

/// Builds the provider prompt for `plan`.
///
/// Until some set has succeeded, `carried` is `None` and the prompt asks the
/// provider to invent the title, summary, hashtags and cast alongside the
/// segments. Once metadata exists it is passed back for continuity and only
/// segments are requested.
pub fn build_set_prompt(
    request: &GenerationRequest,
    plan: &SetPlan,
    total_sets: u32,
    carried: Option<&StoryMetadata>,
) -> String {
    let noun = request.style.segment_noun();
    let mut out = String::new();

    let narrated = !request.no_narration && !request.narration_only_first;
    let _ = writeln!(out, "{}", style_guidance(request.style, narrated));
    let _ = writeln!(out, "Content idea: {}", request.idea.trim());
    let _ = writeln!(
        out,
        "Content rating {}: {}",
        request.content_rating.label(),
        rating_guidance(request.content_rating)
    );
    let _ = writeln!(
        out,
        "The full piece has {} {}s, produced in {} parts. This is part {} of {}.",
        request.total_segments, noun, total_sets, plan.set_number, total_sets
    );

    match carried {
        Some(meta) => {
            if let Some(title) = &meta.title {
                let _ = writeln!(out, "Title: {}", title);
            }
            if let Some(summary) = &meta.summary {
                let _ = writeln!(out, "Story so far: {}", summary);
            }
            let cast = if meta.characters.is_empty() {
                &request.characters
            } else {
                &meta.characters
            };
            write_roster(&mut out, "Keep using these characters:", cast);
        }
        None => {
            if let Some(title) = &request.title {
                let _ = writeln!(out, "Use this exact title: {}", title);
            }
            write_roster(&mut out, "Use these characters:", &request.characters);
        }
    }

    out.push('\n');
    let _ = writeln!(
        out,
        "Write exactly {} {}s, numbered {} to {}.",
        plan.segment_count, noun, plan.start_segment, plan.end_segment
    );
    if let Some(rule) = narration_rules(request, plan) {
        let _ = writeln!(out, "{}", rule);
    }
    if request.allow_dialogue {
        let _ = writeln!(out, "Segments may include a `dialogue` list of {{\"character\", \"line\"}} objects.");
    } else {
        let _ = writeln!(out, "Do not include dialogue.");
    }
    let _ = writeln!(
        out,
        "List the names of characters appearing in each segment in `characters_present`."
    );

    out.push('\n');
    if carried.is_none() {
        let _ = writeln!(
            out,
            "Return STRICT JSON with this shape ONLY:\n\
             {{\"title\":\"...\",\"summary\":\"...\",\"hashtags\":[\"...\"],\
             \"characters\":[{{\"name\":\"...\",\"description\":\"...\"}}],\
             \"segments\":[{{\"scene_description\":\"...\",\"characters_present\":[\"...\"]}}]}}"
        );
    } else {
        let _ = writeln!(
            out,
            "Return STRICT JSON with this shape ONLY:\n\
             {{\"segments\":[{{\"scene_description\":\"...\",\"characters_present\":[\"...\"]}}]}}"
        );
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Character;

    fn plan(set_number: u32, start: u32, end: u32) -> SetPlan {
        SetPlan {
            set_number,
            start_segment: start,
            end_segment: end,
            segment_count: end - start + 1,
        }
    }

    #[test]
    fn first_set_asks_for_metadata() {
        let req = GenerationRequest::new("a robot opens a bakery", 20, 10);
        let prompt = build_set_prompt(&req, &plan(1, 1, 10), 2, None);
        assert!(prompt.contains("a robot opens a bakery"));
        assert!(prompt.contains("numbered 1 to 10"));
        assert!(prompt.contains("\"title\""));
        assert!(prompt.contains("part 1 of 2"));
    }

    #[test]
    fn later_sets_carry_metadata_forward() {
        let req = GenerationRequest::new("a robot opens a bakery", 20, 10);
        let meta = StoryMetadata {
            title: Some("Crumbs of Steel".into()),
            summary: Some("Unit 7 bakes its first loaf.".into()),
            hashtags: vec![],
            characters: vec![Character {
                name: "Unit 7".into(),
                description: None,
                role: Some("baker".into()),
            }],
        };
        let prompt = build_set_prompt(&req, &plan(2, 11, 20), 2, Some(&meta));
        assert!(prompt.contains("Title: Crumbs of Steel"));
        assert!(prompt.contains("- Unit 7 (baker)"));
        assert!(prompt.contains("numbered 11 to 20"));
        assert!(!prompt.contains("\"hashtags\""));
    }

    #[test]
    fn narration_only_first_applies_to_first_segment_only() {
        let mut req = GenerationRequest::new("idea", 10, 5);
        req.narration_only_first = true;
        let first = build_set_prompt(&req, &plan(1, 1, 5), 2, None);
        let second = build_set_prompt(&req, &plan(2, 6, 10), 2, None);
        assert!(first.contains("Only segment 1 gets a `narration`"));
        assert!(second.contains("Do not include any `narration`"));
    }

    #[test]
    fn disabled_narration_is_not_asked_for() {
        let mut req = GenerationRequest::new("idea", 10, 5);
        req.no_narration = true;
        for style in [ContentStyle::Story, ContentStyle::Movie, ContentStyle::Anime] {
            req.style = style;
            let prompt = build_set_prompt(&req, &plan(1, 1, 5), 2, None);
            assert!(!prompt.contains("a `narration`"), "{prompt}");
            assert!(prompt.contains("Do not include any `narration` field."));
        }

        req.no_narration = false;
        req.style = ContentStyle::Movie;
        let prompt = build_set_prompt(&req, &plan(1, 1, 5), 2, None);
        assert!(prompt.contains(
            "Each scene needs a `location`, a `scene_description` of what the camera shows and a `narration`."
        ));
    }

    #[test]
    fn style_and_rating_shape_the_prompt() {
        let mut req = GenerationRequest::new("cats at work", 3, 3);
        req.style = ContentStyle::Meme;
        req.content_rating = ContentRating::Adult;
        req.allow_dialogue = false;
        let prompt = build_set_prompt(&req, &plan(1, 1, 3), 1, None);
        assert!(prompt.contains("meme panels"));
        assert!(prompt.contains("Content rating A"));
        assert!(prompt.contains("Do not include dialogue."));
    }
}
