use std::path::PathBuf;

use tabel_xlsx::XlsxError;
use thiserror::Error;

/// Which of the two input files an id or error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Base,
    Compare,
}

impl Side {
    /// Prepositional Russian file label, as used inside error messages.
    pub fn file_label(self) -> &'static str {
        match self {
            Side::Base => "базовом файле",
            Side::Compare => "файле сравнения",
        }
    }
}

/// Pipeline failure. Display text is the human-readable message surfaced to
/// the caller through the terminal `Failed` event.
#[derive(Debug, Error)]
pub enum CompareError {
    #[error("Ошибка чтения файла {}: {source}", .path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: XlsxError,
    },

    #[error("{}", schema_message(.missing_base, .missing_compare))]
    Schema {
        missing_base: Vec<String>,
        missing_compare: Vec<String>,
    },

    #[error("Дублирующийся идентификатор \"{id}\" в {}", .side.file_label())]
    AlignmentAmbiguity { side: Side, id: String },

    #[error("Ошибка выделения ячеек в файле {}: {source}", .path.display())]
    Annotation {
        path: PathBuf,
        #[source]
        source: XlsxError,
    },

    #[error("Ошибка сохранения отчета {}: {source}", .path.display())]
    Report {
        path: PathBuf,
        #[source]
        source: XlsxError,
    },

    #[error("{0}")]
    Options(String),

    #[error("Сравнение прервано пользователем")]
    Cancelled,
}

fn schema_message(missing_base: &[String], missing_compare: &[String]) -> String {
    let mut sides = Vec::new();
    if !missing_base.is_empty() {
        sides.push(format!(
            "в базовом файле отсутствуют колонки: {}",
            missing_base.join(", ")
        ));
    }
    if !missing_compare.is_empty() {
        sides.push(format!(
            "в файле сравнения отсутствуют колонки: {}",
            missing_compare.join(", ")
        ));
    }
    format!("Неверная структура файлов: {}", sides.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_error_names_both_deficient_sides() {
        let err = CompareError::Schema {
            missing_base: vec!["id".to_string(), "1".to_string()],
            missing_compare: vec!["ФИО".to_string()],
        };
        let text = err.to_string();
        assert!(text.contains("в базовом файле отсутствуют колонки: id, 1"));
        assert!(text.contains("в файле сравнения отсутствуют колонки: ФИО"));
    }

    #[test]
    fn ambiguity_error_names_the_side() {
        let err = CompareError::AlignmentAmbiguity {
            side: Side::Compare,
            id: "42".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Дублирующийся идентификатор \"42\" в файле сравнения"
        );
    }
}
