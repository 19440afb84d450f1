use std::fmt;

#[derive(Debug)]
pub enum CheckpointError {
    MissingEssentialKeys(Vec<String>),
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },
}

impl fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointError::MissingEssentialKeys(keys) => {
                write!(f, "Keys '{}' are missing.", keys.join(", "))
            }
            CheckpointError::ShapeMismatch {
                name,
                expected,
                found,
            } => {
                write!(
                    f,
                    "Shape mismatch for '{}': checkpoint has {:?}, model expects {:?}.",
                    name, found, expected
                )
            }
        }
    }
}

impl std::error::Error for CheckpointError {}
