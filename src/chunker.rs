//! Semantic chunking (SPEC_FULL.md §4.2), grounded in the exact thresholds of
//! the original `file_compass.chunker` module: decorator-inclusive function
//! and class extraction, 2x-max-tokens class truncation with a ~30-line
//! preview, heading-based markdown sections, and a sliding window fallback
//! driven by the file's own chars-per-token ratio.

use crate::types::{Chunk, ChunkType, FileType};
use regex::Regex;
use std::sync::OnceLock;

pub struct FileChunker {
    pub max_chunk_tokens: usize,
    pub chunk_overlap_tokens: usize,
    pub min_chunk_tokens: usize,
}

impl FileChunker {
    pub fn new(max_chunk_tokens: usize, chunk_overlap_tokens: usize, min_chunk_tokens: usize) -> Self {
        Self { max_chunk_tokens, chunk_overlap_tokens, min_chunk_tokens }
    }

    /// Chunks `content` according to `file_type`, falling back to
    /// [`Self::chunk_sliding_window`] when a structural strategy yields
    /// nothing usable. Always returns at least one chunk.
    pub fn chunk_file(&self, file_type: FileType, content: &str) -> Vec<Chunk> {
        let mut chunks = match file_type {
            FileType::Python | FileType::Rust | FileType::JavaScript | FileType::TypeScript | FileType::Go => {
                self.chunk_structured_code(content)
            }
            FileType::Markdown => self.chunk_markdown(content),
            _ => self.chunk_sliding_window(content),
        };

        chunks.retain(|c| Chunk::token_estimate(&c.content) >= self.min_chunk_tokens as f64);

        if chunks.is_empty() {
            chunks = vec![self.whole_file_chunk(content)];
        }

        chunks.sort_by_key(|c| c.line_start);
        chunks
    }

    fn whole_file_chunk(&self, content: &str) -> Chunk {
        let line_count = content.lines().count().max(1);
        Chunk {
            file_id: 0,
            chunk_type: ChunkType::WholeFile,
            name: None,
            line_start: 1,
            line_end: line_count,
            content: content.to_string(),
            preview: Chunk::make_preview(content),
            vector_id: None,
        }
    }

    /// Regex-based function/class extraction shared by brace- and
    /// indent-based languages. Not a real parser: it finds definition
    /// headers and greedily captures a plausible body, which is sufficient
    /// for chunk boundaries even though it would be unsound for a compiler.
    fn chunk_structured_code(&self, content: &str) -> Vec<Chunk> {
        let lines: Vec<&str> = content.lines().collect();
        if lines.is_empty() {
            return Vec::new();
        }

        let def_re = def_regex();
        let mut covered = vec![false; lines.len()];
        let mut chunks = Vec::new();

        let mut i = 0;
        while i < lines.len() {
            let Some(caps) = def_re.captures(lines[i]) else {
                i += 1;
                continue;
            };
            let is_class = caps.name("class").is_some();
            let name = caps.name("name").map(|m| m.as_str().to_string());

            // Walk decorators/annotations upward.
            let mut start = i;
            while start > 0 && is_decorator_line(lines[start - 1]) {
                start -= 1;
            }

            let indent = leading_whitespace(lines[i]);
            let mut end = i;
            for (j, line) in lines.iter().enumerate().skip(i + 1) {
                if line.trim().is_empty() {
                    end = j;
                    continue;
                }
                if leading_whitespace(line) <= indent && !is_decorator_line(line) {
                    break;
                }
                end = j;
            }

            let body: String = lines[start..=end].join("\n");
            let chunk_type = if is_class { ChunkType::Class } else { ChunkType::Function };
            let token_estimate = Chunk::token_estimate(&body);

            let (final_body, final_end) = if is_class && token_estimate > (self.max_chunk_tokens * 2) as f64 {
                let preview_end = (start + 30).min(end);
                let mut truncated: String = lines[start..=preview_end].join("\n");
                truncated.push_str("\n// ... (class continues)");
                (truncated, preview_end)
            } else {
                (body, end)
            };

            for flag in covered.iter_mut().take(final_end + 1).skip(start) {
                *flag = true;
            }

            chunks.push(Chunk {
                file_id: 0,
                chunk_type,
                name,
                line_start: start + 1,
                line_end: final_end + 1,
                preview: Chunk::make_preview(&final_body),
                content: final_body,
                vector_id: None,
            });

            i = end + 1;
        }

        chunks.extend(self.uncovered_runs_as_modules(&lines, &covered));
        chunks
    }

    fn uncovered_runs_as_modules(&self, lines: &[&str], covered: &[bool]) -> Vec<Chunk> {
        let mut out = Vec::new();
        let mut run_start: Option<usize> = None;

        let mut flush = |start: usize, end: usize, out: &mut Vec<Chunk>| {
            let body: String = lines[start..=end].join("\n");
            if body.trim().is_empty() {
                return;
            }
            if Chunk::token_estimate(&body) < self.min_chunk_tokens as f64 {
                return;
            }
            out.push(Chunk {
                file_id: 0,
                chunk_type: ChunkType::Module,
                name: None,
                line_start: start + 1,
                line_end: end + 1,
                preview: Chunk::make_preview(&body),
                content: body,
                vector_id: None,
            });
        };

        for (idx, is_covered) in covered.iter().enumerate() {
            if *is_covered {
                if let Some(s) = run_start.take() {
                    flush(s, idx - 1, &mut out);
                }
            } else if run_start.is_none() {
                run_start = Some(idx);
            }
        }
        if let Some(s) = run_start {
            flush(s, lines.len() - 1, &mut out);
        }
        out
    }

    fn chunk_markdown(&self, content: &str) -> Vec<Chunk> {
        let heading_re = heading_regex();
        let lines: Vec<&str> = content.lines().collect();

        let headings: Vec<(usize, usize, String)> = lines
            .iter()
            .enumerate()
            .filter_map(|(i, line)| {
                heading_re.captures(line).map(|c| {
                    let level = c.name("hashes").unwrap().as_str().len();
                    let title = c.name("title").unwrap().as_str().trim().to_string();
                    (i, level, title)
                })
            })
            .map(|(i, level, title)| (i, level, title))
            .collect();

        if headings.is_empty() {
            return self.chunk_sliding_window(content);
        }

        let mut chunks = Vec::new();
        for (idx, (line_idx, level, title)) in headings.iter().enumerate() {
            let mut end = lines.len() - 1;
            for (other_line, other_level, _) in headings.iter().skip(idx + 1) {
                if other_level <= level {
                    end = other_line.saturating_sub(1);
                    break;
                }
            }
            let body: String = lines[*line_idx..=end].join("\n");
            if body.trim().is_empty() {
                continue;
            }
            chunks.push(Chunk {
                file_id: 0,
                chunk_type: ChunkType::Section,
                name: Some(title.clone()),
                line_start: line_idx + 1,
                line_end: end + 1,
                preview: Chunk::make_preview(&body),
                content: body,
                vector_id: None,
            });
        }
        chunks
    }

    /// Sliding window over lines, sized by the file's own chars-per-token
    /// ratio so `max_tokens`/`overlap_tokens` translate consistently across
    /// files with very different line lengths.
    pub fn chunk_sliding_window(&self, content: &str) -> Vec<Chunk> {
        let lines: Vec<&str> = content.lines().collect();
        if lines.is_empty() {
            return Vec::new();
        }

        let total_tokens = Chunk::token_estimate(content).max(1.0);
        let chars_per_token = content.len() as f64 / total_tokens;
        let max_chars = self.max_chunk_tokens as f64 * chars_per_token;
        let overlap_chars = self.chunk_overlap_tokens as f64 * chars_per_token;

        let mut chunks = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut current_chars = 0.0_f64;
        let mut start_idx = 0usize;

        let mut idx = 0usize;
        while idx < lines.len() {
            let line = lines[idx];
            let line_chars = (line.len() + 1) as f64;

            if !current.is_empty() && current_chars + line_chars > max_chars {
                let end_idx = start_idx + current.len() - 1;
                chunks.push(self.window_chunk(&current, start_idx, end_idx));

                // Carry overlap lines from the tail into the next window.
                let mut overlap_lines = Vec::new();
                let mut overlap_size = 0.0_f64;
                for &l in current.iter().rev() {
                    if overlap_size + (l.len() + 1) as f64 > overlap_chars {
                        break;
                    }
                    overlap_lines.push(l);
                    overlap_size += (l.len() + 1) as f64;
                }
                overlap_lines.reverse();
                start_idx = end_idx + 1 - overlap_lines.len();
                current = overlap_lines;
                current_chars = current.iter().map(|l| (l.len() + 1) as f64).sum();
            }

            current.push(line);
            current_chars += line_chars;
            idx += 1;
        }

        if !current.is_empty() {
            let end_idx = lines.len() - 1;
            chunks.push(self.window_chunk(&current, start_idx, end_idx));
        }

        chunks
    }

    fn window_chunk(&self, lines: &[&str], start_idx: usize, end_idx: usize) -> Chunk {
        let body = lines.join("\n");
        Chunk {
            file_id: 0,
            chunk_type: ChunkType::Window,
            name: None,
            line_start: start_idx + 1,
            line_end: end_idx + 1,
            preview: Chunk::make_preview(&body),
            content: body,
            vector_id: None,
        }
    }
}

fn leading_whitespace(line: &str) -> usize {
    line.chars().take_while(|c| c.is_whitespace()).count()
}

fn is_decorator_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with('@') || trimmed.starts_with("#[")
}

fn def_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\s*(?:pub\s+|export\s+|async\s+)*(?:def\s+(?P<name>\w+)|fn\s+(?P<name2>\w+)|function\s+(?P<name3>\w+)|(?P<class>class)\s+(?P<cname>\w+))",
        )
        .unwrap()
    })
}

fn heading_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?P<hashes>#{1,6})\s+(?P<title>.+)$").unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker() -> FileChunker {
        FileChunker::new(400, 50, 1)
    }

    #[test]
    fn extracts_python_function() {
        let src = "def hello():\n    return 1\n\ndef world():\n    return 2\n";
        let chunks = chunker().chunk_file(FileType::Python, src);
        let names: Vec<_> = chunks.iter().filter_map(|c| c.name.clone()).collect();
        assert!(names.contains(&"hello".to_string()));
        assert!(names.contains(&"world".to_string()));
    }

    #[test]
    fn chunk_line_ranges_are_valid() {
        let src = "def hello():\n    return 1\n";
        let chunks = chunker().chunk_file(FileType::Python, src);
        let line_count = src.lines().count();
        for c in &chunks {
            assert!(c.line_start >= 1);
            assert!(c.line_start <= c.line_end);
            assert!(c.line_end <= line_count);
        }
    }

    #[test]
    fn markdown_sections_split_on_headings() {
        let src = "# Title\nIntro text.\n\n## Sub\nMore text.\n";
        let chunks = chunker().chunk_file(FileType::Markdown, src);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].name.as_deref(), Some("Title"));
        assert_eq!(chunks[1].name.as_deref(), Some("Sub"));
    }

    #[test]
    fn markdown_without_headings_falls_back_to_window() {
        let src = "just some\nplain text\nwith no headings\n";
        let chunks = chunker().chunk_file(FileType::Markdown, src);
        assert!(chunks.iter().all(|c| c.chunk_type == ChunkType::Window));
    }

    #[test]
    fn whole_file_fallback_when_nothing_survives_min_tokens() {
        let c = FileChunker::new(400, 50, 1000);
        let src = "x = 1\n";
        let chunks = c.chunk_file(FileType::Other, src);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_type, ChunkType::WholeFile);
    }

    #[test]
    fn preview_is_at_most_203_chars_and_suffixed_on_truncation() {
        let long = "a".repeat(500);
        let preview = Chunk::make_preview(&long);
        assert!(preview.ends_with("..."));
        assert!(preview.len() <= 203);
    }
}
