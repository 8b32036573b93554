use std::path::PathBuf;

use sea_orm::DbErr;
use thiserror::Error;

/// Every failure of an import run. All of them end the process with status 1;
/// the `Display` text is what gets printed to the console.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("사용법: import_funeral_homes <csv_file_path>\n예시: import_funeral_homes /path/to/data.csv")]
    Usage,

    #[error("파일이 존재하지 않습니다: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("파일을 읽을 수 없습니다: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV 파일 인코딩을 확인할 수 없습니다.")]
    UnknownEncoding,

    #[error("CSV 형식 오류: {0}")]
    Csv(#[from] csv::Error),

    #[error("파싱된 데이터가 없습니다.")]
    NoRecords,

    #[error("좌표 변환기 초기화 실패: {0}")]
    Projection(String),

    #[error("DB 설정 오류: {0}")]
    Config(String),

    #[error("DB 오류: {0}")]
    Db(#[from] DbErr),
}

pub type Result<T> = std::result::Result<T, ImportError>;
