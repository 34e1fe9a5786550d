//! DOM response extractor.
//!
//! Fallback extraction path: a read script collects the outerHTML of the
//! most recent assistant block per prioritized selector (plus the answer
//! block count and any artifact panel) in one call; the engine converts
//! the first non-trivial candidate to markdown.

use scraper::{ElementRef, Html, Node};
use serde::Deserialize;
use serde_json::json;

use crate::error::Result;
use crate::page::PageAutomation;
use crate::provider::ProviderStrategy;

/// Candidates shorter than this never win a selector slot.
const MIN_TEXT_LEN: usize = 10;

/// Interface chrome that selector drift sometimes captures instead of an
/// answer. A short candidate containing one of these is not an answer.
const BOILERPLATE: &[&str] = &[
	"can make mistakes",
	"may display inaccurate info",
	"Ask anything",
	"Regenerate",
	"How can I help you today",
];

/// One DOM read: winning text (if any) and the visible block count.
#[derive(Debug, Clone, Default)]
pub struct DomRead {
	pub text: Option<String>,
	pub block_count: Option<usize>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadPayload {
	#[serde(default)]
	candidates: Vec<Candidate>,
	#[serde(default)]
	block_count: usize,
	#[serde(default)]
	artifact: Option<Artifact>,
}

#[derive(Deserialize)]
struct Candidate {
	#[allow(dead_code)]
	selector: String,
	html: String,
}

#[derive(Deserialize)]
struct Artifact {
	#[serde(default)]
	title: String,
	code: String,
	#[serde(default)]
	language: String,
}

/// Builds the one-shot read script for a provider.
fn read_script(strategy: &dyn ProviderStrategy) -> String {
	let selectors = json!(strategy.extraction_selectors());
	let block_selector = json!(strategy.answer_block_selector());
	let artifact = match strategy.artifact_panel() {
		Some(panel) => json!({
			"panel": panel.panel_selector,
			"title": panel.title_selector,
			"code": panel.code_selector,
		}),
		None => json!(null),
	};
	format!(
		r#"(() => {{
	const selectors = {selectors};
	const candidates = [];
	for (const sel of selectors) {{
		try {{
			const nodes = document.querySelectorAll(sel);
			if (nodes.length > 0) {{
				const el = nodes[nodes.length - 1];
				candidates.push({{ selector: sel, html: el.outerHTML }});
			}}
		}} catch (_) {{}}
	}}
	let __pxBlocks = 0;
	try {{ __pxBlocks = document.querySelectorAll({block_selector}).length; }} catch (_) {{}}
	let artifact = null;
	const panelCfg = {artifact};
	if (panelCfg) {{
		try {{
			const panel = document.querySelector(panelCfg.panel);
			if (panel) {{
				const titleEl = panel.querySelector(panelCfg.title);
				const codeEl = panel.querySelector(panelCfg.code);
				if (codeEl) {{
					const cls = codeEl.className || "";
					const lang = (cls.match(/language-([\w-]+)/) || [])[1] || "";
					artifact = {{ title: titleEl ? titleEl.innerText : "", code: codeEl.innerText, language: lang }};
				}}
			}}
		}} catch (_) {{}}
	}}
	return {{ candidates, blockCount: __pxBlocks, artifact }};
}})()"#
	)
}

/// Runs one DOM extraction pass.
///
/// Returns `text: None` when no selector yields a non-trivial candidate;
/// that reads as "no text yet" upstream, never as an error.
pub async fn extract(page: &dyn PageAutomation, strategy: &dyn ProviderStrategy) -> Result<DomRead> {
	let value = page.execute_script(strategy.id(), &read_script(strategy)).await?;
	let payload: ReadPayload = match serde_json::from_value(value) {
		Ok(payload) => payload,
		Err(e) => {
			tracing::debug!(target = "px.extract", provider = %strategy.id(), error = %e, "bad read payload");
			return Ok(DomRead::default());
		}
	};

	let block_count = strategy.counts_answer_blocks().then_some(payload.block_count);

	let mut text = payload.candidates.iter().find_map(|candidate| {
		let converted = html_to_markdown(&candidate.html);
		non_trivial(&converted).then_some(converted)
	});

	if let Some(current) = text.take() {
		let current = if strategy.interleaved_transcript() {
			last_substantial_segment(&current)
		} else {
			current
		};
		let current = match payload.artifact {
			Some(artifact) if !artifact.code.trim().is_empty() => append_artifact(&current, &artifact),
			_ => current,
		};
		text = Some(current);
	}

	Ok(DomRead { text, block_count })
}

fn non_trivial(text: &str) -> bool {
	let trimmed = text.trim();
	if trimmed.len() < MIN_TEXT_LEN {
		return false;
	}
	// Short fragments of interface chrome are not answers; a long text
	// that merely mentions a phrase is fine.
	!(trimmed.len() < 160 && BOILERPLATE.iter().any(|phrase| trimmed.contains(phrase)))
}

/// Keeps the last substantial timestamp-delimited segment of a shared
/// transcript container.
fn last_substantial_segment(text: &str) -> String {
	let mut segments: Vec<Vec<&str>> = vec![Vec::new()];
	for line in text.lines() {
		if looks_like_timestamp(line) {
			segments.push(Vec::new());
		} else {
			segments.last_mut().expect("segments is never empty").push(line);
		}
	}

	segments
		.iter()
		.rev()
		.map(|lines| lines.join("\n").trim().to_string())
		.find(|segment| segment.len() >= MIN_TEXT_LEN)
		.unwrap_or_else(|| text.trim().to_string())
}

/// Timestamp-like markers: "12:31", "3:45 PM", "Today at 14:02".
fn looks_like_timestamp(line: &str) -> bool {
	let trimmed = line.trim();
	if trimmed.is_empty() || trimmed.len() > 24 {
		return false;
	}
	let Some(colon) = trimmed.find(':') else {
		return false;
	};
	let before = trimmed[..colon].chars().next_back();
	let after = trimmed[colon + 1..].chars().next();
	matches!((before, after), (Some(b), Some(a)) if b.is_ascii_digit() && a.is_ascii_digit())
		&& trimmed
			.chars()
			.all(|c| c.is_ascii_digit() || c.is_ascii_alphabetic() || c == ':' || c == ' ')
}

fn append_artifact(text: &str, artifact: &Artifact) -> String {
	let title = if artifact.title.trim().is_empty() {
		"Artifact"
	} else {
		artifact.title.trim()
	};
	format!(
		"{}\n\n### {}\n\n```{}\n{}\n```",
		text.trim_end(),
		title,
		artifact.language,
		artifact.code.trim_end()
	)
}

/// Converts an HTML fragment to markdown-flavored plain text.
///
/// Depth-first walk over the parsed fragment: headings, emphasis, links,
/// lists, tables and fenced code blocks map to markdown; everything else
/// contributes its text. Consecutive blank lines collapse afterwards.
pub fn html_to_markdown(html: &str) -> String {
	let fragment = Html::parse_fragment(html);
	let mut out = String::new();
	walk_children(fragment.root_element(), &mut out, &ListContext::None);
	collapse_blank_lines(&out)
}

enum ListContext {
	None,
	Unordered,
	Ordered(std::cell::Cell<usize>),
}

fn walk_element(element: ElementRef<'_>, out: &mut String, list: &ListContext) {
	let name = element.value().name();
	match name {
		"script" | "style" | "button" | "svg" => {}
		"h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
			let level = name[1..].parse::<usize>().unwrap_or(1);
			ensure_blank_line(out);
			out.push_str(&"#".repeat(level));
			out.push(' ');
			walk_children(element, out, list);
			out.push_str("\n\n");
		}
		"p" => {
			ensure_blank_line(out);
			walk_children(element, out, list);
			out.push_str("\n\n");
		}
		"br" => out.push('\n'),
		"strong" | "b" => {
			out.push_str("**");
			walk_children(element, out, list);
			out.push_str("**");
		}
		"em" | "i" => {
			out.push('*');
			walk_children(element, out, list);
			out.push('*');
		}
		"a" => {
			let mut label = String::new();
			walk_children(element, &mut label, list);
			match element.value().attr("href") {
				Some(href) => out.push_str(&format!("[{}]({})", label.trim(), href)),
				None => out.push_str(&label),
			}
		}
		"pre" => {
			let code = element
				.select(&scraper::Selector::parse("code").expect("static selector"))
				.next();
			let (language, body) = match code {
				Some(code_el) => (code_language(&code_el), element_text(&code_el)),
				None => (String::new(), element_text(&element)),
			};
			ensure_blank_line(out);
			out.push_str(&format!("```{}\n{}\n```\n\n", language, body.trim_end()));
		}
		"code" => {
			// Inline code; block code was consumed by the `pre` arm.
			out.push('`');
			walk_children(element, out, list);
			out.push('`');
		}
		"ul" => {
			ensure_blank_line(out);
			walk_children(element, out, &ListContext::Unordered);
			out.push('\n');
		}
		"ol" => {
			ensure_blank_line(out);
			walk_children(element, out, &ListContext::Ordered(std::cell::Cell::new(0)));
			out.push('\n');
		}
		"li" => {
			match list {
				ListContext::Ordered(counter) => {
					counter.set(counter.get() + 1);
					out.push_str(&format!("{}. ", counter.get()));
				}
				_ => out.push_str("- "),
			}
			walk_children(element, out, &ListContext::None);
			out.push('\n');
		}
		"blockquote" => {
			ensure_blank_line(out);
			let mut inner = String::new();
			walk_children(element, &mut inner, list);
			for line in collapse_blank_lines(&inner).lines() {
				out.push_str("> ");
				out.push_str(line);
				out.push('\n');
			}
			out.push('\n');
		}
		"table" => {
			ensure_blank_line(out);
			render_table(element, out);
			out.push('\n');
		}
		_ => walk_children(element, out, list),
	}
}

fn walk_children(element: ElementRef<'_>, out: &mut String, list: &ListContext) {
	for child in element.children() {
		if let Some(child_element) = ElementRef::wrap(child) {
			walk_element(child_element, out, list);
		} else if let Node::Text(text) = child.value() {
			let content: &str = text;
			if !content.trim().is_empty() {
				out.push_str(&content.replace('\n', " "));
			}
		}
	}
}

fn render_table(table: ElementRef<'_>, out: &mut String) {
	let row_selector = scraper::Selector::parse("tr").expect("static selector");
	let cell_selector = scraper::Selector::parse("th, td").expect("static selector");

	let mut first = true;
	for row in table.select(&row_selector) {
		let cells: Vec<String> = row
			.select(&cell_selector)
			.map(|cell| element_text(&cell).replace('\n', " ").trim().to_string())
			.collect();
		if cells.is_empty() {
			continue;
		}
		out.push_str(&format!("| {} |\n", cells.join(" | ")));
		if first {
			out.push_str(&format!("|{}\n", " --- |".repeat(cells.len())));
			first = false;
		}
	}
}

fn code_language(code: &ElementRef<'_>) -> String {
	code.value()
		.attr("class")
		.and_then(|classes| {
			classes
				.split_whitespace()
				.find_map(|class| class.strip_prefix("language-"))
		})
		.unwrap_or("")
		.to_string()
}

fn element_text(element: &ElementRef<'_>) -> String {
	element.text().collect::<String>()
}

fn ensure_blank_line(out: &mut String) {
	if out.is_empty() {
		return;
	}
	while !out.ends_with("\n\n") {
		out.push('\n');
	}
}

fn collapse_blank_lines(text: &str) -> String {
	let mut out = String::with_capacity(text.len());
	let mut blank_run = 0usize;
	for line in text.lines() {
		if line.trim().is_empty() {
			blank_run += 1;
			if blank_run > 1 {
				continue;
			}
			out.push('\n');
		} else {
			blank_run = 0;
			out.push_str(line.trim_end());
			out.push('\n');
		}
	}
	out.trim().to_string()
}
