use std::fs;
use std::path::Path;

use clap::Parser;
use duotower_cli::{Cli, Commands, LossArg};
use duotower_core::LossMode;
use tempfile::{tempdir, TempDir};

fn write_dataset(dir: &Path) {
    fs::write(
        dir.join("u.item"),
        "1|Toy Story (1995)|01-Jan-1995||url|0|0|0|1|1|1|0|0|0|0|0|0|0|0|0|0|0|0|0\n\
         2|GoldenEye (1995)|01-Jan-1995||url|0|1|1|0|0|0|0|0|0|0|0|0|0|0|0|0|1|0|0\n\
         3|Sleepless in Seattle (1993)|01-Jan-1993||url|0|0|0|0|0|1|0|0|0|0|0|0|0|0|1|0|0|0|0\n\
         4|Alien (1979)|01-Jan-1979||url|0|1|0|0|0|0|0|0|0|0|0|1|0|0|0|1|0|0|0\n",
    )
    .unwrap();
    fs::write(
        dir.join("u.data"),
        "10\t1\t5\t100\n10\t2\t3\t101\n11\t2\t4\t102\n11\t3\t5\t103\n12\t3\t2\t104\n12\t4\t5\t105\n",
    )
    .unwrap();
}

fn dataset() -> TempDir {
    let dir = tempdir().unwrap();
    write_dataset(dir.path());
    dir
}

#[test]
fn test_parses_recommend_flags() {
    let cli = Cli::parse_from([
        "duotower",
        "recommend",
        "--data-dir",
        "ml-100k",
        "--user",
        "196",
        "--top-k",
        "5",
        "--loss",
        "bpr",
        "--epochs",
        "3",
    ]);
    match cli.command {
        Commands::Recommend(cmd) => {
            assert_eq!(cmd.user, 196);
            assert_eq!(cmd.top_k, 5);
            assert_eq!(cmd.session.loss, Some(LossArg::Bpr));
            assert_eq!(cmd.session.epochs, Some(3));
            assert_eq!(cmd.session.data_dir, Path::new("ml-100k"));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_rejects_missing_user() {
    assert!(Cli::try_parse_from(["duotower", "recommend", "--data-dir", "d"]).is_err());
}

#[test]
fn test_config_file_then_flags() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("config.json");
    fs::write(&config_path, r#"{"epochs": 9, "embedding_dim": 12, "seed": 5}"#).unwrap();
    let config_arg = config_path.to_string_lossy().into_owned();

    let cli = Cli::parse_from([
        "duotower",
        "train",
        "--data-dir",
        "unused",
        "--config",
        config_arg.as_str(),
        "--epochs",
        "2",
        "--loss",
        "bpr",
    ]);
    let Commands::Train(cmd) = cli.command else {
        panic!("expected train");
    };
    let config = cmd.session.training_config().unwrap();
    assert_eq!(config.epochs, 2);
    assert_eq!(config.embedding_dim, 12);
    assert_eq!(config.seed, 5);
    assert_eq!(config.loss_mode, LossMode::Bpr);
    assert_eq!(config.batch_size, 256);
}

#[test]
fn test_invalid_config_is_reported() {
    let cli = Cli::parse_from(["duotower", "train", "--data-dir", "d", "--embedding-dim", "0"]);
    let Commands::Train(cmd) = cli.command else {
        panic!("expected train");
    };
    let err = cmd.session.training_config().unwrap_err();
    assert!(format!("{:#}", err).contains("embedding_dim"), "{:#}", err);
}

#[tokio::test]
async fn test_trains_on_dataset_directory() {
    let dir = dataset();
    let data_dir = dir.path().to_string_lossy().into_owned();
    let cli = Cli::parse_from([
        "duotower",
        "recommend",
        "--data-dir",
        data_dir.as_str(),
        "--user",
        "10",
        "--epochs",
        "2",
        "--embedding-dim",
        "8",
    ]);
    let Commands::Recommend(cmd) = cli.command else {
        panic!("expected recommend");
    };
    let session = cmd.session.trained_session().await.unwrap();
    assert_eq!(session.users().len(), 3);
    assert_eq!(session.items().len(), 4);
    assert_eq!(session.trajectory().unwrap().epoch_means().len(), 2);
    assert_eq!(session.item(3).unwrap().genres, vec!["Action", "Horror", "Sci-Fi"]);

    cmd.run().await.unwrap();
}

#[tokio::test]
async fn test_commands_run_end_to_end() {
    let dir = dataset();
    let data_dir = dir.path().to_string_lossy().into_owned();
    let base = ["--data-dir", data_dir.as_str(), "--epochs", "2", "--embedding-dim", "8"];

    let run = |args: &[&str]| {
        let mut argv = vec!["duotower"];
        argv.extend_from_slice(args);
        argv.extend_from_slice(&base);
        Cli::parse_from(argv).command
    };

    match run(&["train", "--side-features"]) {
        Commands::Train(cmd) => cmd.run().await.unwrap(),
        other => panic!("unexpected {:?}", other),
    }
    match run(&["evaluate", "--min-interactions", "2"]) {
        Commands::Evaluate(cmd) => cmd.run().await.unwrap(),
        other => panic!("unexpected {:?}", other),
    }
    match run(&["project", "--sample-size", "3"]) {
        Commands::Project(cmd) => cmd.run().await.unwrap(),
        other => panic!("unexpected {:?}", other),
    }
    match run(&["query", "--text", "romantic comedy"]) {
        Commands::Query(cmd) => cmd.run().await.unwrap(),
        other => panic!("unexpected {:?}", other),
    }
    match run(&["query", "--text", "zzz"]) {
        Commands::Query(cmd) => cmd.run().await.unwrap(),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_evaluate_without_qualifying_user_fails() {
    let dir = dataset();
    let data_dir = dir.path().to_string_lossy().into_owned();
    let cli = Cli::parse_from([
        "duotower",
        "evaluate",
        "--data-dir",
        data_dir.as_str(),
        "--epochs",
        "1",
    ]);
    let Commands::Evaluate(cmd) = cli.command else {
        panic!("expected evaluate");
    };
    assert!(cmd.run().await.is_err());
}
