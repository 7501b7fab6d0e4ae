//! OpenOCD `remote_bitbang` server driving the SoC's JTAG pins.

use std::io::{self, BufReader, BufWriter, Read, Write};
use std::net::{TcpListener, TcpStream};

use log::{debug, info, trace};
use mtk_core::{Simulator, Soc};

/// Ticks the SoC runs after every pin write, enough for the TAP's synchronizers to see it.
const TICKS_PER_WRITE: u64 = 4;

/// Accepts one client at a time until a client sends `Q`.
pub fn serve(mut simulator: Simulator<Soc>, port: u16) -> io::Result<()> {
    let address = format!("localhost:{port}");
    let listener = TcpListener::bind(&address)?;
    info!("waiting for a remote_bitbang connection on {address}");
    loop {
        let (stream, peer) = listener.accept()?;
        info!("debugger connected from {peer}");
        match session(&mut simulator, stream)? {
            Session::Quit => return Ok(()),
            Session::Disconnected => info!("debugger disconnected"),
        }
    }
}

enum Session {
    Quit,
    Disconnected,
}

fn session(simulator: &mut Simulator<Soc>, stream: TcpStream) -> io::Result<Session> {
    stream.set_nodelay(true)?;
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = BufWriter::new(stream);
    let mut byte = [0u8];
    loop {
        if reader.read(&mut byte)? == 0 {
            return Ok(Session::Disconnected);
        }
        trace!("bitbang command {:?}", byte[0] as char);
        match byte[0] {
            command @ b'0'..=b'7' => {
                let bits = command - b'0';
                let soc = simulator.simulatable_mut();
                soc.set_pins(bits & 0b100 != 0, bits & 0b010 != 0, bits & 0b001 != 0);
                simulator.step_n(TICKS_PER_WRITE);
            }
            b'R' => {
                writer.write_all(match simulator.simulatable().tdo() {
                    true => b"1",
                    false => b"0",
                })?;
                writer.flush()?;
            }
            b'r'..=b'u' | b'B' | b'b' => {}
            b'Q' => {
                debug!("quit requested after {} ticks", simulator.ticks());
                return Ok(Session::Quit);
            }
            other => debug!("ignoring unknown bitbang command {other:#04x}"),
        }
    }
}
