//! Page planning for printed documents.
//!
//! Blocks are measured up front and packed greedily onto pages. A table that fits on
//! one page is never split: if it does not fit in the space left, it moves to the next
//! page. A table taller than a whole page starts on a fresh page and is left breakable.

use serde::Serialize;

/// A4 height minus the template's top and bottom margins, in millimetres.
pub const A4_USABLE_HEIGHT_MM: f64 = 297.0 - 2.0 * 16.0;

const LINE_HEIGHT_MM: f64 = 5.5;
const TABLE_ROW_MM: f64 = 8.0;
const TABLE_HEADER_MM: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Text,
    Table,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Block {
    pub name: String,
    pub kind: BlockKind,
    pub height_mm: f64,
}

impl Block {
    pub fn text(name: &str, lines: usize) -> Self {
        Self { name: name.to_string(), kind: BlockKind::Text, height_mm: lines as f64 * LINE_HEIGHT_MM }
    }

    pub fn table(name: &str, rows: usize) -> Self {
        Self {
            name: name.to_string(),
            kind: BlockKind::Table,
            height_mm: TABLE_HEADER_MM + rows as f64 * TABLE_ROW_MM,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedBlock {
    pub name: String,
    /// False only for tables taller than a page.
    pub keep_together: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Page {
    pub blocks: Vec<PlacedBlock>,
}

pub fn paginate(blocks: &[Block], page_height_mm: f64) -> Vec<Page> {
    let mut pages = vec![Page::default()];
    let mut used = 0.0;

    for block in blocks {
        let oversized = block.height_mm > page_height_mm;
        let fits = used + block.height_mm <= page_height_mm;
        let page_has_content = pages.last().is_some_and(|p| !p.blocks.is_empty());

        let needs_break = match block.kind {
            BlockKind::Table => page_has_content && (oversized || !fits),
            BlockKind::Text => page_has_content && !fits,
        };
        if needs_break {
            pages.push(Page::default());
            used = 0.0;
        }

        if let Some(page) = pages.last_mut() {
            page.blocks.push(PlacedBlock {
                name: block.name.clone(),
                keep_together: !(block.kind == BlockKind::Table && oversized),
            });
        }
        used += block.height_mm;
        if oversized {
            used %= page_height_mm;
        }
    }
    pages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(pages: &[Page]) -> Vec<Vec<&str>> {
        pages.iter().map(|p| p.blocks.iter().map(|b| b.name.as_str()).collect()).collect()
    }

    #[test]
    fn everything_on_one_page_when_it_fits() {
        let blocks = [Block::text("header", 6), Block::table("items", 5), Block::text("sign", 8)];
        let pages = paginate(&blocks, A4_USABLE_HEIGHT_MM);
        assert_eq!(names(&pages), vec![vec!["header", "items", "sign"]]);
    }

    #[test]
    fn table_moves_to_next_page_instead_of_splitting() {
        let blocks = [Block::text("header", 30), Block::table("items", 12), Block::text("sign", 4)];
        let pages = paginate(&blocks, 200.0);
        assert_eq!(names(&pages), vec![vec!["header"], vec!["items", "sign"]]);
        assert!(pages[1].blocks[0].keep_together);
    }

    #[test]
    fn oversized_table_starts_fresh_and_may_break() {
        let blocks = [Block::text("header", 4), Block::table("items", 40), Block::text("sign", 4)];
        let pages = paginate(&blocks, 200.0);
        assert_eq!(pages[1].blocks[0].name, "items");
        assert!(!pages[1].blocks[0].keep_together);
    }

    #[test]
    fn first_block_never_leaves_an_empty_page() {
        let pages = paginate(&[Block::table("items", 40)], 200.0);
        assert_eq!(pages.len(), 1);
    }
}
