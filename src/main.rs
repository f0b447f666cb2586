use clap::{Parser, Subcommand};
use qadocs::Result;
use qadocs::commands::{
    add_feedback, ask, delete_document, generate_test_case, list_documents, reindex, show_status,
    upload_documents,
};
use qadocs::config::{run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "qadocs")]
#[command(about = "Document ingestion, hybrid retrieval and test case generation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the Ollama connection and pipeline settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Upload documents (PDF, DOCX, XLSX, XLS, CSV) and build their index
    Upload {
        /// Files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Base document type, e.g. "product_spec" or "test_case"
        #[arg(long)]
        doc_type: String,
        /// Product title (single-file uploads only; defaults to the file name)
        #[arg(long)]
        title: Option<String>,
        /// Process only the first N pages
        #[arg(long)]
        max_pages: Option<usize>,
    },
    /// List stored documents
    List,
    /// Delete a stored document version and its index
    Delete {
        /// Product title
        title: String,
        /// Exact doc_type of the version to delete
        doc_type: String,
    },
    /// Rebuild the vector index for a stored document version
    Reindex {
        /// Product title
        title: String,
        /// Exact doc_type of the version to reindex
        doc_type: String,
    },
    /// Hybrid search across all stored documents
    Ask {
        /// The question or keywords to search for
        question: String,
        /// Number of results to return
        #[arg(short, long, default_value_t = 10)]
        k: usize,
    },
    /// Generate a test case for a product feature
    Generate {
        /// Feature description to generate a test case for
        feature: String,
        /// Product title whose documentation grounds the generation
        #[arg(long)]
        product: String,
        /// Optional reference product whose test cases inform the output
        #[arg(long)]
        reference: Option<String>,
        /// Feedback on the previous attempt, applied to this generation
        #[arg(long)]
        feedback: Option<String>,
    },
    /// Store feedback on a generated test case
    Feedback {
        /// Product title
        #[arg(long)]
        product: String,
        /// Feature the feedback refers to
        #[arg(long)]
        feature: String,
        /// The feedback text
        feedback: String,
    },
    /// Show connectivity and storage status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Upload {
            files,
            doc_type,
            title,
            max_pages,
        } => {
            upload_documents(files, doc_type, title, max_pages).await?;
        }
        Commands::List => {
            list_documents().await?;
        }
        Commands::Delete { title, doc_type } => {
            delete_document(title, doc_type).await?;
        }
        Commands::Reindex { title, doc_type } => {
            reindex(title, doc_type).await?;
        }
        Commands::Ask { question, k } => {
            ask(question, k).await?;
        }
        Commands::Generate {
            feature,
            product,
            reference,
            feedback,
        } => {
            generate_test_case(feature, product, reference, feedback).await?;
        }
        Commands::Feedback {
            product,
            feature,
            feedback,
        } => {
            add_feedback(product, feature, feedback).await?;
        }
        Commands::Status => {
            show_status().await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["qadocs", "list"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            matches!(parsed.command, Commands::List);
        }
    }

    #[test]
    fn upload_requires_doc_type() {
        let cli = Cli::try_parse_from(["qadocs", "upload", "manual.pdf"]);
        assert!(cli.is_err());

        let cli = Cli::try_parse_from([
            "qadocs",
            "upload",
            "manual.pdf",
            "--doc-type",
            "product_spec",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Upload {
                files,
                doc_type,
                title,
                max_pages,
            } = parsed.command
            {
                assert_eq!(files, vec![PathBuf::from("manual.pdf")]);
                assert_eq!(doc_type, "product_spec");
                assert_eq!(title, None);
                assert_eq!(max_pages, None);
            }
        }
    }

    #[test]
    fn upload_accepts_multiple_files() {
        let cli = Cli::try_parse_from([
            "qadocs",
            "upload",
            "a.pdf",
            "b.docx",
            "c.csv",
            "--doc-type",
            "test_case",
            "--max-pages",
            "10",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Upload {
                files, max_pages, ..
            } = parsed.command
            {
                assert_eq!(files.len(), 3);
                assert_eq!(max_pages, Some(10));
            }
        }
    }

    #[test]
    fn ask_has_default_k() {
        let cli = Cli::try_parse_from(["qadocs", "ask", "what is the trip threshold"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ask { question, k } = parsed.command {
                assert_eq!(question, "what is the trip threshold");
                assert_eq!(k, 10);
            }
        }
    }

    #[test]
    fn generate_command_parsing() {
        let cli = Cli::try_parse_from([
            "qadocs",
            "generate",
            "voltage unbalance",
            "--product",
            "Relay X",
            "--reference",
            "Relay Y",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Generate {
                feature,
                product,
                reference,
                feedback,
            } = parsed.command
            {
                assert_eq!(feature, "voltage unbalance");
                assert_eq!(product, "Relay X");
                assert_eq!(reference, Some("Relay Y".to_string()));
                assert_eq!(feedback, None);
            }
        }
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["qadocs", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Config { show } = parsed.command {
                assert!(show);
            }
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["qadocs", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["qadocs", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
