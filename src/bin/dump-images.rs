use docopt::Docopt;
use serde::Deserialize;

use gl_capture::initstate::{InitialContents, InitialState};
use gl_capture::write_image::{self, ExportError};
use gl_capture::Recording;

use std::io;
use std::path::Path;

static USAGE: &str = "
Extract texture images from a gl-capture capture file.

For every texture whose initial contents were captured, write each face and
mip level as an image named `frameF-ID-faceX-levelL.png` in <dir>, where F is
the frame's index in the file, ID is the texture's resource id, and X is the
face target in hex.

Usage:
  dump-images <file> <dir>
";

#[derive(Debug, Deserialize)]
struct Args {
    arg_file: String,
    arg_dir: String,
}

fn main() -> io::Result<()> {
    env_logger::init();
    let args: Args = Docopt::new(USAGE)
        .and_then(|d| d.deserialize())
        .unwrap_or_else(|e| e.exit());

    let recording = Recording::load(&args.arg_file)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    let dir = Path::new(&args.arg_dir);

    let mut count = 0;
    for (frame_index, frame) in recording.frames.iter().enumerate() {
        for chunk in &frame.initial {
            let state: InitialState = match chunk.read() {
                Ok(state) => state,
                Err(err) => {
                    log::warn!("frame {}: skipping malformed initial contents: {}", frame_index, err);
                    continue;
                }
            };
            let texture = match &state.contents {
                InitialContents::Texture(texture) => texture,
                _ => continue,
            };
            for level in &texture.levels {
                let filename = format!("frame{}-{}-face{:x}-level{}.png",
                                       frame_index, state.id.raw(), level.face, level.level);
                match write_image::write_texture_level(dir.join(&filename), texture, level) {
                    Ok(()) => count += 1,
                    Err(ExportError::UnsupportedFormat { format, ty }) => {
                        println!("{}: format 0x{:x}, type 0x{:x} not supported", filename, format, ty);
                        break;
                    }
                    Err(ExportError::Io(err)) => return Err(err),
                    Err(err) => println!("{}: {}", filename, err),
                }
            }
        }
    }
    println!("wrote {} texture images", count);

    Ok(())
}
