use vergen_gitcl::{BuildBuilder, CargoBuilder, Emitter, GitclBuilder};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let build = BuildBuilder::default().build_date(true).build()?;
    let cargo = CargoBuilder::default().target_triple(true).build()?;
    let gitcl = GitclBuilder::default().sha(true).build()?;

    let emitted = Emitter::default()
        .add_instructions(&build)?
        .add_instructions(&cargo)?
        .add_instructions(&gitcl)?
        .emit();

    // ソース tarball からのビルドなど git が使えない場合
    if emitted.is_err() {
        println!("cargo::rustc-env=VERGEN_BUILD_DATE=unknown");
        println!("cargo::rustc-env=VERGEN_CARGO_TARGET_TRIPLE=unknown");
        println!("cargo::rustc-env=VERGEN_GIT_SHA={}", fallback_sha());
    }

    Ok(())
}

/// CI では GITHUB_SHA の先頭 7 文字を使う。
fn fallback_sha() -> String {
    match std::env::var("GITHUB_SHA") {
        Ok(sha) => sha.chars().take(7).collect(),
        Err(_) => "unknown".to_string(),
    }
}
