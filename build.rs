use std::error::Error;

use vergen::{BuildBuilder, Emitter};

fn main() -> Result<(), Box<dyn Error>> {
    // The startup banner only surfaces the build timestamp.
    let build = BuildBuilder::all_build()?;
    Emitter::default().add_instructions(&build)?.emit()?;
    Ok(())
}
