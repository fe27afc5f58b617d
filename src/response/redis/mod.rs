//! Interface with the upstream bus: the RESP codec, the two Redis
//! connections, and the fan-out manager.
mod connection;
mod manager;
mod msg;

pub use connection::{RedisConnErr, RedisReader};
pub use manager::Manager;

pub(crate) use manager::ListenerId;

/// Build one RESP command frame from its arguments.
pub(crate) fn resp_cmd(args: &[&str]) -> Vec<u8> {
    let mut cmd = format!("*{}\r\n", args.len()).into_bytes();
    for arg in args {
        cmd.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        cmd.extend_from_slice(arg.as_bytes());
        cmd.extend_from_slice(b"\r\n");
    }
    cmd
}

#[cfg(test)]
mod test {
    use super::resp_cmd;

    #[test]
    fn commands_are_framed_as_resp_arrays() {
        assert_eq!(
            resp_cmd(&["SUBSCRIBE", "timeline:public"]),
            b"*2\r\n$9\r\nSUBSCRIBE\r\n$15\r\ntimeline:public\r\n".to_vec(),
        );
        assert_eq!(
            resp_cmd(&["SETEX", "subscribed:timeline:public", "1080", "1"]),
            b"*4\r\n$5\r\nSETEX\r\n$26\r\nsubscribed:timeline:public\r\n$4\r\n1080\r\n$1\r\n1\r\n"
                .to_vec(),
        );
    }
}
