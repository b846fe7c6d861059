//! Block prioritization and grid packing.
//!
//! The grid holds at most [`MAX_BLOCKS`] blocks and [`GRID_BUDGET`] units.
//! Blocks keep the order the model returned them in; when the budget is
//! exceeded, the least important blocks shrink first.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::document::{Block, BlockSize, BlockType, GRID_BUDGET, MAX_BLOCKS, total_units};

static API_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(api|endpoints?|authentication|oauth)\b").expect("valid regex"));

static TUTORIAL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(tutorials?|guides?|getting started|setup|steps?)\b").expect("valid regex")
});

static ARCHITECTURE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(architecture|systems?|components?|infrastructure)\b").expect("valid regex")
});

static VISUAL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(visual|diagrams?|flow)").expect("valid regex"));

static STEP_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(step|guide|tutorial)").expect("valid regex"));

/// Instruction keyword hits count this many times more than text hits.
const INSTRUCTION_WEIGHT: usize = 10;

/// Broad kind of document, used to favour matching block types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentCategory {
    ApiReference,
    Tutorial,
    Architecture,
    General,
}

impl ContentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApiReference => "api_reference",
            Self::Tutorial => "tutorial",
            Self::Architecture => "architecture",
            Self::General => "general",
        }
    }

    /// Block types that suit this category best.
    pub fn affinity(&self) -> [BlockType; 3] {
        match self {
            Self::ApiReference => [BlockType::ApiReference, BlockType::Code, BlockType::Guide],
            Self::Tutorial => [BlockType::Guide, BlockType::Code, BlockType::Troubleshooting],
            Self::Architecture => [BlockType::Architecture, BlockType::Diagram, BlockType::KeyPoints],
            Self::General => [BlockType::KeyPoints, BlockType::Summary, BlockType::BestPractices],
        }
    }
}

/// Classify a document by keyword density.
///
/// The category with the most keyword hits wins; ties go to the earlier of
/// API reference, tutorial, architecture. No hits at all means `General`.
pub fn detect_category(text: &str, instructions: Option<&str>) -> ContentCategory {
    let instructions = instructions.unwrap_or_default();
    let hits = |pattern: &Regex| {
        pattern.find_iter(text).count() + pattern.find_iter(instructions).count() * INSTRUCTION_WEIGHT
    };

    let ranked = [
        (ContentCategory::ApiReference, hits(&API_PATTERN)),
        (ContentCategory::Tutorial, hits(&TUTORIAL_PATTERN)),
        (ContentCategory::Architecture, hits(&ARCHITECTURE_PATTERN)),
    ];

    ranked
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .fold(None, |best: Option<(ContentCategory, usize)>, (category, count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((category, count)),
        })
        .map(|(category, _)| category)
        .unwrap_or(ContentCategory::General)
}

/// Importance of a block type before any boosts.
pub fn base_priority(block_type: BlockType) -> u32 {
    match block_type {
        BlockType::Summary => 10,
        BlockType::ApiReference => 9,
        BlockType::KeyPoints => 8,
        BlockType::Diagram => 7,
        BlockType::Guide => 7,
        BlockType::Architecture => 6,
        BlockType::BestPractices => 6,
        BlockType::Code => 5,
        BlockType::Troubleshooting => 5,
        BlockType::Comparison => 4,
    }
}

/// Priority of a block type for a document of `category` given the
/// submitter's instructions.
pub fn priority(block_type: BlockType, category: ContentCategory, instructions: Option<&str>) -> u32 {
    let mut score = base_priority(block_type);

    if category.affinity().contains(&block_type) {
        score += 2;
    }

    let Some(instructions) = instructions.map(str::to_lowercase) else {
        return score;
    };

    score += match block_type {
        BlockType::ApiReference if instructions.contains("api") => 3,
        BlockType::Code if instructions.contains("api") => 2,
        BlockType::Diagram if VISUAL_PATTERN.is_match(&instructions) => 3,
        BlockType::Guide if STEP_PATTERN.is_match(&instructions) => 3,
        _ => 0,
    };

    let name = block_type.as_str().replace('_', " ");
    if block_type != BlockType::ApiReference && instructions.contains(&name) {
        score += 2;
    }

    score
}

/// Keep the first block of each type, in model order, up to [`MAX_BLOCKS`].
///
/// Selection ignores [`priority`]: a low-priority type the model listed
/// early can displace a later high-priority one. Priority only decides which
/// of the kept blocks are shrunk first when the grid budget is exceeded.
pub fn select_blocks(blocks: Vec<Block>) -> Vec<Block> {
    let mut seen = HashSet::new();
    blocks.into_iter().filter(|b| seen.insert(b.block_type)).take(MAX_BLOCKS).collect()
}

/// Shrink blocks until the grid fits within [`GRID_BUDGET`].
///
/// Large blocks are downgraded to medium first, lowest priority first (the
/// later block on ties), then medium to small by the same rule.
pub fn pack_blocks(blocks: &mut [Block], priority_of: impl Fn(BlockType) -> u32) {
    for from in [BlockSize::Large, BlockSize::Medium] {
        while total_units(blocks) > GRID_BUDGET {
            let victim = blocks
                .iter()
                .enumerate()
                .filter(|(_, b)| b.size == from)
                .min_by(|(ia, a), (ib, b)| {
                    priority_of(a.block_type)
                        .cmp(&priority_of(b.block_type))
                        .then_with(|| ib.cmp(ia))
                })
                .map(|(index, _)| index);

            let Some(index) = victim else { break };
            if let Some(smaller) = blocks[index].size.downgrade() {
                blocks[index].size = smaller;
            }
        }
    }
}

/// Select and pack parsed blocks for a document.
pub fn arrange(blocks: Vec<Block>, category: ContentCategory, instructions: Option<&str>) -> Vec<Block> {
    let mut selected = select_blocks(blocks);
    let before = total_units(&selected);
    pack_blocks(&mut selected, |block_type| priority(block_type, category, instructions));

    let after = total_units(&selected);
    if after != before {
        tracing::debug!(before, after, "downgraded blocks to fit the grid");
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::BTreeMap;

    fn block(block_type: BlockType, size: BlockSize) -> Block {
        Block {
            id: format!("{}-{}", block_type.as_str(), size.as_str()),
            block_type,
            size,
            title: block_type.as_str().to_string(),
            content: "content".to_string(),
            metadata: BTreeMap::new(),
        }
    }

    #[rstest]
    #[case("Call the REST API endpoint with OAuth authentication.", None, ContentCategory::ApiReference)]
    #[case("Getting started: follow each step of this tutorial.", None, ContentCategory::Tutorial)]
    #[case("The system has three components and shared infrastructure.", None, ContentCategory::Architecture)]
    #[case("A quiet essay about gardening.", None, ContentCategory::General)]
    #[case("The system has components.", Some("show me the api"), ContentCategory::ApiReference)]
    fn test_detect_category(
        #[case] text: &str, #[case] instructions: Option<&str>, #[case] expected: ContentCategory,
    ) {
        assert_eq!(detect_category(text, instructions), expected);
    }

    #[test]
    fn test_priority_boosts() {
        let general = ContentCategory::General;
        assert_eq!(priority(BlockType::Summary, general, None), 12);
        assert_eq!(priority(BlockType::ApiReference, general, Some("Focus on the API")), 12);
        assert_eq!(priority(BlockType::Code, general, Some("Focus on the API")), 7);
        assert_eq!(priority(BlockType::Diagram, general, Some("visualize the flow")), 10);
        assert_eq!(priority(BlockType::Guide, ContentCategory::Tutorial, Some("step by step")), 12);
        assert_eq!(priority(BlockType::Troubleshooting, general, Some("add troubleshooting tips")), 7);
    }

    #[test]
    fn test_select_keeps_first_of_each_type() {
        let blocks = vec![
            block(BlockType::Summary, BlockSize::Large),
            block(BlockType::Summary, BlockSize::Small),
            block(BlockType::Code, BlockSize::Small),
        ];
        let selected = select_blocks(blocks);
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].size, BlockSize::Large);
        assert_eq!(selected[1].block_type, BlockType::Code);
    }

    #[test]
    fn test_select_follows_model_order_not_priority() {
        let blocks = vec![
            block(BlockType::Comparison, BlockSize::Small),
            block(BlockType::Troubleshooting, BlockSize::Small),
            block(BlockType::Code, BlockSize::Small),
            block(BlockType::BestPractices, BlockSize::Small),
            block(BlockType::Architecture, BlockSize::Small),
            block(BlockType::Guide, BlockSize::Small),
            block(BlockType::Summary, BlockSize::Large),
        ];
        let selected = select_blocks(blocks);
        assert_eq!(selected.len(), MAX_BLOCKS);
        assert_eq!(selected[0].block_type, BlockType::Comparison);
        assert!(selected.iter().all(|b| b.block_type != BlockType::Summary));
    }

    #[test]
    fn test_pack_within_budget_untouched() {
        let mut blocks = vec![
            block(BlockType::Summary, BlockSize::Large),
            block(BlockType::KeyPoints, BlockSize::Medium),
            block(BlockType::Code, BlockSize::Small),
            block(BlockType::Guide, BlockSize::Small),
        ];
        let before = blocks.clone();
        pack_blocks(&mut blocks, base_priority);
        assert_eq!(blocks, before);
        assert_eq!(total_units(&blocks), 7);
    }

    #[test]
    fn test_pack_downgrades_lowest_priority_large_first() {
        let mut blocks = vec![
            block(BlockType::Summary, BlockSize::Large),
            block(BlockType::Comparison, BlockSize::Large),
            block(BlockType::Code, BlockSize::Large),
        ];
        pack_blocks(&mut blocks, base_priority);

        assert_eq!(total_units(&blocks), 8);
        assert_eq!(blocks[0].size, BlockSize::Large);
        assert_eq!(blocks[1].size, BlockSize::Medium);
        assert_eq!(blocks[2].size, BlockSize::Large);
    }

    #[test]
    fn test_pack_ties_downgrade_later_block() {
        let mut blocks = vec![
            block(BlockType::Code, BlockSize::Large),
            block(BlockType::Troubleshooting, BlockSize::Large),
            block(BlockType::Summary, BlockSize::Large),
        ];
        pack_blocks(&mut blocks, base_priority);

        assert_eq!(blocks[0].size, BlockSize::Large);
        assert_eq!(blocks[1].size, BlockSize::Medium);
    }

    #[test]
    fn test_pack_six_large_blocks_fit() {
        let types = [
            BlockType::Summary,
            BlockType::KeyPoints,
            BlockType::Architecture,
            BlockType::Diagram,
            BlockType::Code,
            BlockType::Comparison,
        ];
        let mut blocks: Vec<Block> = types.iter().map(|t| block(*t, BlockSize::Large)).collect();
        pack_blocks(&mut blocks, base_priority);

        assert!(total_units(&blocks) <= GRID_BUDGET);
        assert_eq!(blocks.len(), 6);
        assert_eq!(blocks[0].size, BlockSize::Medium);
        assert_eq!(blocks[5].size, BlockSize::Small);
    }

    #[test]
    fn test_arrange_invariants_hold_for_any_input() {
        let sizes = [BlockSize::Small, BlockSize::Medium, BlockSize::Large];
        for seed in 0..64usize {
            let blocks: Vec<Block> = (0..10)
                .map(|i| block(BlockType::ALL[(seed + i * 3) % 10], sizes[(seed / 3 + i) % 3]))
                .collect();
            let arranged = arrange(blocks, ContentCategory::General, Some("diagram please"));

            assert!(arranged.len() <= MAX_BLOCKS);
            assert!(total_units(&arranged) <= GRID_BUDGET);
            let distinct: HashSet<BlockType> = arranged.iter().map(|b| b.block_type).collect();
            assert_eq!(distinct.len(), arranged.len());
        }
    }
}
