//! 跨模块组帧/编解码行为：任意切分的字节流必须与整块投递产出相同帧序列，
//! 且自编码的帧能通过自家解码器还原。

use tgw_protocol::{
    Codec, DecodeContext, FrameBuffer, FrameStatus, Framing, Gt06Codec, PacketPayload,
    TeltonikaCodec,
};

fn drain(buffer: &mut FrameBuffer, framing: Framing) -> Vec<Vec<u8>> {
    let mut frames = Vec::new();
    loop {
        match buffer.try_take_frame(framing) {
            FrameStatus::Frame(frame) => frames.push(frame),
            FrameStatus::NeedMore => return frames,
            FrameStatus::Invalid => panic!("unexpected invalid frame"),
        }
    }
}

fn chunked_equals_whole(stream: &[u8], framing: Framing, chunk_sizes: &[usize]) {
    let mut whole = FrameBuffer::new();
    whole.append(stream);
    let expected = drain(&mut whole, framing);

    let mut buffer = FrameBuffer::new();
    let mut got = Vec::new();
    let mut at = 0;
    let mut step = 0;
    while at < stream.len() {
        let size = chunk_sizes[step % chunk_sizes.len()].max(1);
        let end = (at + size).min(stream.len());
        buffer.append(&stream[at..end]);
        got.extend(drain(&mut buffer, framing));
        at = end;
        step += 1;
    }
    assert_eq!(got, expected);
}

#[test]
fn gt06_stream_reassembly_is_split_invariant() {
    let codec = Gt06Codec::default();
    let mut stream = Vec::new();
    for serial in 1u16..=5 {
        stream.extend_from_slice(&codec.encode_command("STATUS#", serial).unwrap());
    }
    for chunk_sizes in [&[1usize][..], &[2, 3][..], &[7, 1, 4][..], &[64][..]] {
        chunked_equals_whole(&stream, Framing::Gt06, chunk_sizes);
    }
}

#[test]
fn teltonika_stream_reassembly_is_split_invariant() {
    let codec = TeltonikaCodec::default();
    let mut stream = vec![0x00, 0x0f];
    stream.extend_from_slice(b"357689078699600");
    stream.extend_from_slice(&codec.encode_command("getinfo").unwrap());
    stream.extend_from_slice(&codec.encode_command("getver").unwrap());
    for chunk_sizes in [&[1usize][..], &[3, 5][..], &[16, 2][..]] {
        chunked_equals_whole(&stream, Framing::Teltonika, chunk_sizes);
    }
}

#[test]
fn gt06_encoded_frames_survive_own_decoder() {
    // 自编码往返：encode_command 产物经组帧 + 解码后 serial 原样保留
    let codec = Codec::Gt06(Gt06Codec::default());
    for serial in [0u16, 1, 0x7fff, 0xffff] {
        let frame = codec.encode_command("RELAY,1#", serial).unwrap();
        let mut buffer = FrameBuffer::new();
        buffer.append(&frame);
        let FrameStatus::Frame(taken) = buffer.try_take_frame(codec.framing()) else {
            panic!("frame not reassembled");
        };
        let packet = codec
            .decode_frame(&taken, &DecodeContext::default())
            .expect("decode");
        assert_eq!(packet.serial, Some(serial));
    }
}

#[test]
fn teltonika_command_survives_own_decoder() {
    let codec = Codec::Teltonika(TeltonikaCodec { strict_crc: true });
    let frame = codec.encode_command("setdigout 11", 0).unwrap();
    let mut buffer = FrameBuffer::new();
    buffer.append(&frame);
    let FrameStatus::Frame(taken) = buffer.try_take_frame(codec.framing()) else {
        panic!("frame not reassembled");
    };
    // strict 模式也能通过：编码侧 CRC 正确
    let packet = codec
        .decode_frame(&taken, &DecodeContext::default())
        .expect("decode");
    match packet.payload {
        PacketPayload::Teltonika(tgw_protocol::teltonika::TeltonikaPayload::CommandResponse(
            text,
        )) => assert_eq!(text, "setdigout 11"),
        other => panic!("unexpected payload: {:?}", other),
    }
}
