pub const RECIPE_INSTRUCTION: &str = include_str!("../data/prompts/recipe_instruction.txt");

/// Keys the instruction asks the model to return.
pub const RECIPE_KEYS: [&str; 7] = [
    "nombre_receta",
    "personas",
    "tiempo_total",
    "imagen",
    "ingredientes",
    "pasos_con_tiempo",
    "alergenos",
];

/// Instruction text sent alongside the image, without trailing whitespace.
pub fn recipe_instruction() -> &'static str {
    RECIPE_INSTRUCTION.trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Allergen;

    #[test]
    fn test_instruction_is_trimmed() {
        let text = recipe_instruction();
        assert!(!text.is_empty());
        assert!(!text.ends_with('\n'));
        assert!(text.starts_with("Devuélveme"));
    }

    #[test]
    fn test_instruction_names_every_key() {
        for key in RECIPE_KEYS {
            assert!(recipe_instruction().contains(key), "missing key {}", key);
        }
    }

    #[test]
    fn test_instruction_lists_every_allergen() {
        for allergen in Allergen::ALL {
            let quoted = format!("\"{}\"", allergen.label());
            assert!(
                recipe_instruction().contains(&quoted),
                "missing allergen {}",
                allergen
            );
        }
    }

    #[test]
    fn test_instruction_asks_for_catalan() {
        assert!(recipe_instruction().contains("catalán"));
    }
}
