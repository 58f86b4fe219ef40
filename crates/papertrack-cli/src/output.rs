use std::io::Write;

use owo_colors::OwoColorize;
use papertrack_core::{
    Notice, NoticeLevel, PaperCard, PaperId, StatusKind, TagRef, TagTaxonomy, ToggleOutcome,
};

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// Print the paper list: a count header, then one card per paper.
pub fn render_papers(
    w: &mut dyn Write,
    cards: &[PaperCard],
    show_summary: bool,
    color: ColorMode,
) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(w, "{} {}", "Papers:".bold(), cards.len())?;
    } else {
        writeln!(w, "Papers: {}", cards.len())?;
    }

    if cards.is_empty() {
        writeln!(w)?;
        if color.enabled() {
            writeln!(w, "{}", "No papers found.".dimmed())?;
        } else {
            writeln!(w, "No papers found.")?;
        }
        return Ok(());
    }

    for (i, card) in cards.iter().enumerate() {
        writeln!(w)?;
        render_card(w, i + 1, card, show_summary, color)?;
    }
    Ok(())
}

fn render_card(
    w: &mut dyn Write,
    number: usize,
    card: &PaperCard,
    show_summary: bool,
    color: ColorMode,
) -> std::io::Result<()> {
    let paper = &card.paper;
    let title = paper.title.as_deref().unwrap_or("(untitled)");

    let mut badges = Vec::new();
    if card.is_read {
        badges.push("[read]");
    }
    if card.is_favorite {
        badges.push("[favorite]");
    }
    let badges = badges.join(" ");

    if color.enabled() {
        let title = if card.is_read {
            title.dimmed().to_string()
        } else {
            title.bold().to_string()
        };
        if badges.is_empty() {
            writeln!(w, "{}. {}", number, title)?;
        } else {
            writeln!(w, "{}. {}  {}", number, title, badges.yellow())?;
        }
        writeln!(w, "   {}", paper.paper_url.cyan())?;
    } else {
        if badges.is_empty() {
            writeln!(w, "{}. {}", number, title)?;
        } else {
            writeln!(w, "{}. {}  {}", number, title, badges)?;
        }
        writeln!(w, "   {}", paper.paper_url)?;
    }

    if !paper.authors.is_empty() {
        writeln!(w, "   Authors: {}", paper.authors.join(", "))?;
    }

    let mut meta = Vec::new();
    if let Some(published) = &paper.published {
        meta.push(published.clone());
    }
    if !paper.categories.is_empty() {
        meta.push(paper.categories.join(", "));
    }
    if !meta.is_empty() {
        let line = meta.join(" | ");
        if color.enabled() {
            writeln!(w, "   {}", line.dimmed())?;
        } else {
            writeln!(w, "   {}", line)?;
        }
    }

    if !card.tags.is_empty() {
        let names = tag_names(&card.tags);
        if color.enabled() {
            writeln!(w, "   Tags: {}", names.green())?;
        } else {
            writeln!(w, "   Tags: {}", names)?;
        }
    }

    if show_summary && let Some(summary) = &paper.summary {
        writeln!(w, "   {}", truncate(summary.trim(), 300))?;
    }
    Ok(())
}

/// Print the tag tree, children indented under their parents.
pub fn render_taxonomy(
    w: &mut dyn Write,
    taxonomy: &TagTaxonomy,
    color: ColorMode,
) -> std::io::Result<()> {
    if taxonomy.is_empty() {
        writeln!(w, "No tags defined.")?;
        return Ok(());
    }
    for (depth, tag) in taxonomy.flatten() {
        let indent = "  ".repeat(depth);
        if color.enabled() {
            writeln!(w, "{}{} {}", indent, tag.name, format!("({})", tag.id).dimmed())?;
        } else {
            writeln!(w, "{}{} ({})", indent, tag.name, tag.id)?;
        }
    }
    Ok(())
}

/// Print the tags assigned to one paper, each with its full path when the
/// taxonomy knows it.
pub fn render_paper_tags(
    w: &mut dyn Write,
    paper_id: &PaperId,
    tags: &[TagRef],
    taxonomy: &TagTaxonomy,
    color: ColorMode,
) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(w, "{}", paper_id.cyan())?;
    } else {
        writeln!(w, "{}", paper_id)?;
    }
    if tags.is_empty() {
        writeln!(w, "  (no tags)")?;
    }
    for tag in tags {
        let label = match taxonomy.path_to(tag.id) {
            Some(path) => path.join(" / "),
            None => tag.name.clone(),
        };
        if color.enabled() {
            writeln!(w, "  {} {}", label, format!("({})", tag.id).dimmed())?;
        } else {
            writeln!(w, "  {} ({})", label, tag.id)?;
        }
    }
    Ok(())
}

pub fn render_status_set(
    w: &mut dyn Write,
    kind: StatusKind,
    ids: &[PaperId],
    color: ColorMode,
) -> std::io::Result<()> {
    let header = format!("{} papers: {}", capitalize(kind.label()), ids.len());
    if color.enabled() {
        writeln!(w, "{}", header.bold())?;
    } else {
        writeln!(w, "{}", header)?;
    }
    for id in ids {
        writeln!(w, "  {}", id)?;
    }
    Ok(())
}

pub fn render_categories(w: &mut dyn Write, categories: &[String]) -> std::io::Result<()> {
    if categories.is_empty() {
        writeln!(w, "No categories.")?;
    }
    for category in categories {
        writeln!(w, "{}", category)?;
    }
    Ok(())
}

/// Print the state a toggle left the flag in.
pub fn print_toggle_result(
    w: &mut dyn Write,
    kind: StatusKind,
    paper_id: &PaperId,
    value: bool,
    outcome: &ToggleOutcome,
    color: ColorMode,
) -> std::io::Result<()> {
    let state = match (kind, value) {
        (StatusKind::Read, true) => "read",
        (StatusKind::Read, false) => "unread",
        (StatusKind::Favorite, true) => "favorite",
        (StatusKind::Favorite, false) => "not favorite",
    };
    match outcome {
        ToggleOutcome::Confirmed | ToggleOutcome::Superseded => {
            if color.enabled() {
                writeln!(w, "{} is now {}", paper_id, state.green())?;
            } else {
                writeln!(w, "{} is now {}", paper_id, state)?;
            }
        }
        // The notice already explained the failure.
        ToggleOutcome::RolledBack(_) => {
            writeln!(w, "{} is still {}", paper_id, state)?;
        }
    }
    Ok(())
}

pub fn print_notice(w: &mut dyn Write, notice: &Notice, color: ColorMode) -> std::io::Result<()> {
    match notice.level {
        NoticeLevel::Info => {
            if color.enabled() {
                writeln!(w, "{}", notice.message.green())?;
            } else {
                writeln!(w, "{}", notice.message)?;
            }
        }
        NoticeLevel::Error => {
            if color.enabled() {
                writeln!(w, "{} {}", "ERROR:".red(), notice.message)?;
            } else {
                writeln!(w, "ERROR: {}", notice.message)?;
            }
        }
    }
    Ok(())
}

fn tag_names(tags: &[TagRef]) -> String {
    tags.iter()
        .map(|t| t.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use papertrack_core::{CustomTag, Paper};

    fn card(id: &str, title: Option<&str>) -> PaperCard {
        PaperCard {
            paper: Paper {
                paper_url: PaperId::from(id),
                title: title.map(str::to_string),
                authors: vec!["Ada".into(), "Grace".into()],
                summary: Some("A long summary.".into()),
                categories: vec!["cs.CL".into()],
                published: Some("2025-03-01 10:00:00".into()),
                is_read: None,
                is_favorite: None,
                custom_tags: None,
            },
            is_read: false,
            is_favorite: false,
            tags: vec![],
        }
    }

    fn render(cards: &[PaperCard]) -> String {
        let mut buf = Vec::new();
        render_papers(&mut buf, cards, false, ColorMode(false)).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn three_unmarked_papers() {
        let cards = vec![
            card("https://x/1", Some("One")),
            card("https://x/2", Some("Two")),
            card("https://x/3", Some("Three")),
        ];
        let out = render(&cards);
        assert!(out.starts_with("Papers: 3\n"));
        assert!(out.contains("1. One\n"));
        assert!(out.contains("2. Two\n"));
        assert!(out.contains("3. Three\n"));
        assert!(!out.contains("[read]"));
        assert!(!out.contains("[favorite]"));
    }

    #[test]
    fn empty_list_shows_empty_state() {
        let out = render(&[]);
        assert_eq!(out, "Papers: 0\n\nNo papers found.\n");
    }

    #[test]
    fn card_shows_badges_and_tags() {
        let mut c = card("https://x/1", None);
        c.is_read = true;
        c.is_favorite = true;
        c.tags = vec![TagRef::new(5, "NLP"), TagRef::new(7, "Vision")];
        let out = render(&[c]);
        assert!(out.contains("1. (untitled)  [read] [favorite]"));
        assert!(out.contains("   Authors: Ada, Grace"));
        assert!(out.contains("   2025-03-01 10:00:00 | cs.CL"));
        assert!(out.contains("   Tags: NLP, Vision"));
        assert!(!out.contains("A long summary."));
    }

    #[test]
    fn summary_only_when_requested() {
        let mut buf = Vec::new();
        render_papers(&mut buf, &[card("p", Some("T"))], true, ColorMode(false)).unwrap();
        assert!(String::from_utf8(buf).unwrap().contains("A long summary."));
    }

    #[test]
    fn taxonomy_is_indented() {
        let taxonomy = TagTaxonomy::new(vec![CustomTag {
            id: 1,
            name: "CS".into(),
            children: vec![CustomTag {
                id: 5,
                name: "NLP".into(),
                children: vec![],
            }],
        }]);
        let mut buf = Vec::new();
        render_taxonomy(&mut buf, &taxonomy, ColorMode(false)).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "CS (1)\n  NLP (5)\n");
    }

    #[test]
    fn paper_tags_show_taxonomy_path() {
        let taxonomy = TagTaxonomy::new(vec![CustomTag {
            id: 1,
            name: "CS".into(),
            children: vec![CustomTag {
                id: 5,
                name: "NLP".into(),
                children: vec![],
            }],
        }]);
        let tags = [TagRef::new(5, "NLP"), TagRef::new(9, "Orphan")];
        let mut buf = Vec::new();
        render_paper_tags(&mut buf, &PaperId::from("p"), &tags, &taxonomy, ColorMode(false))
            .unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "p\n  CS / NLP (5)\n  Orphan (9)\n"
        );
    }

    #[test]
    fn paper_without_tags() {
        let mut buf = Vec::new();
        let taxonomy = TagTaxonomy::new(vec![]);
        render_paper_tags(&mut buf, &PaperId::from("p"), &[], &taxonomy, ColorMode(false)).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "p\n  (no tags)\n");
    }

    #[test]
    fn error_notice_is_prefixed() {
        let mut buf = Vec::new();
        let notice = Notice {
            level: NoticeLevel::Error,
            message: "duplicate".into(),
        };
        print_notice(&mut buf, &notice, ColorMode(false)).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "ERROR: duplicate\n");
    }

    #[test]
    fn rolled_back_toggle_reports_old_state() {
        let mut buf = Vec::new();
        print_toggle_result(
            &mut buf,
            StatusKind::Read,
            &PaperId::from("p"),
            false,
            &ToggleOutcome::RolledBack("HTTP 500".into()),
            ColorMode(false),
        )
        .unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "p is still unread\n");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé...");
        assert_eq!(truncate("hi", 5), "hi");
    }
}
