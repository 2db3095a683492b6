use async_trait::async_trait;

use crate::error::TransformError;
use crate::imaging::EncodedImage;
use crate::models::{DesignIntensity, StyleOption};

/// Remote image backend: restyles a room photo, or edits an existing design.
///
/// Implementations own their timeout policy; a timeout is just another
/// `TransformError`.
#[async_trait]
pub trait ImageTransformer: Send + Sync {
    async fn generate(&self, image: &EncodedImage, style: &StyleOption, intensity: DesignIntensity) -> Result<EncodedImage, TransformError>;

    async fn edit(&self, image: &EncodedImage, instruction: &str) -> Result<EncodedImage, TransformError>;
}

pub fn intensity_clause(style: &StyleOption, intensity: DesignIntensity) -> String {
    match intensity {
        DesignIntensity::Subtle => "Focus on minimal, clean staging. Maintain airy white walls or very light neutral tones. Add essential furniture with slim profiles. Keep the original character of the room prominent. Subtle accents only.".to_string(),
        DesignIntensity::Bold => "MAXIMALIST APPROACH. Transform the room completely. Structural wood paneling, floor-to-ceiling textures, bold statement furniture, and dramatic lighting. No blank walls allowed. Use high-contrast materials and deep colors.".to_string(),
        DesignIntensity::Balanced => format!("Balanced professional staging. Add sophisticated {style} furniture, layered rugs, and tasteful wall decor. Use a mix of textures without overwhelming the space. Magazine-quality lighting."),
    }
}

pub fn build_design_prompt(style: &StyleOption, intensity: DesignIntensity) -> String {
    let clause = intensity_clause(style, intensity);
    format!("Photorealistic Interior Design Transformation: {style} style. CONTEXT: High-end interior architect staging a condo. INTENSITY LEVEL: {intensity}. {clause} REQUIREMENT: Professional, high-resolution, magazine-quality photograph. Keep structural walls and windows as they are.")
}

pub fn build_edit_prompt(instruction: &str) -> String {
    format!("Edit this room design. Instruction: \"{instruction}\". Requirement: Maintain the high level of detail and texture. If adding items, ensure they have realistic shadows and textures. Keep the professional staging aesthetic.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_prompt_mentions_style_twice() {
        let style = StyleOption::new("Modern Farmhouse");
        let prompt = build_design_prompt(&style, DesignIntensity::Balanced);
        assert!(prompt.starts_with("Photorealistic Interior Design Transformation: Modern Farmhouse style."));
        assert!(prompt.contains("INTENSITY LEVEL: Balanced."));
        assert!(prompt.contains("sophisticated Modern Farmhouse furniture"));
    }

    #[test]
    fn bold_and_subtle_use_their_own_clauses() {
        let style = StyleOption::new("European Classic");
        assert!(build_design_prompt(&style, DesignIntensity::Bold).contains("MAXIMALIST APPROACH"));
        assert!(build_design_prompt(&style, DesignIntensity::Subtle).contains("Subtle accents only."));
    }

    #[test]
    fn edit_prompt_quotes_the_instruction() {
        assert!(build_edit_prompt("make walls blue").contains("Instruction: \"make walls blue\"."));
    }
}
