//! Wire-protocol exchanges against a scripted transport and a loopback
//! server.

use std::io::{Cursor, Read, Write};
use std::net::TcpListener;

use sentry_edge::{
    DetectionBackend, Frame, FrameDims, ProtocolError, RemoteBackend, RemoteInferenceClient,
};

/// In-memory transport: reads come from a pre-scripted server response
/// buffer, writes are captured for inspection.
struct ScriptedTransport {
    responses: Cursor<Vec<u8>>,
    written: Vec<u8>,
}

impl ScriptedTransport {
    fn new(responses: Vec<u8>) -> Self {
        Self {
            responses: Cursor::new(responses),
            written: Vec::new(),
        }
    }
}

impl Read for ScriptedTransport {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.responses.read(buf)
    }
}

impl Write for ScriptedTransport {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn field10(value: usize) -> Vec<u8> {
    // Server pads the 10-byte decimal fields with trailing spaces.
    format!("{:<10}", value).into_bytes()
}

fn script(box_count: usize, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"1"); // frame-name ack
    out.extend_from_slice(b"2"); // dimensions ack
    out.extend_from_slice(&field10(box_count));
    out.extend_from_slice(&field10(payload.len()));
    out.extend_from_slice(payload);
    out
}

const DIMS: FrameDims = FrameDims {
    width: 4,
    height: 2,
    channels: 3,
};

#[test]
fn empty_result_yields_empty_batch_without_error() {
    let transport = ScriptedTransport::new(script(0, b""));
    let mut client = RemoteInferenceClient::new(transport);

    let pixels = vec![0u8; DIMS.byte_len()];
    let detections = client
        .classify_frame("cam_1_frame_00001", DIMS, &pixels)
        .expect("zero boxes is a valid response");
    assert!(detections.is_empty());
}

#[test]
fn exchange_writes_name_dims_and_pixels_in_order() {
    let payload = b"header\n0,img,MAN,7.0,1.0,2.0,3.0,4.0,0.9\n";
    let transport = ScriptedTransport::new(script(1, payload));
    let mut client = RemoteInferenceClient::new(transport);

    let pixels: Vec<u8> = (0..DIMS.byte_len() as u8).collect();
    let detections = client
        .classify_frame("cam_2_frame_00003", DIMS, &pixels)
        .unwrap();

    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].class_label, "MAN");
    assert_eq!(detections[0].class_id, 7);

    // Client wrote: name, then "height,width,channels", then raw pixels.
    let written = client.into_inner().written;
    let mut expected = Vec::new();
    expected.extend_from_slice(b"cam_2_frame_00003");
    expected.extend_from_slice(b"2,4,3");
    expected.extend_from_slice(&pixels);
    assert_eq!(written, expected);
}

#[test]
fn declared_count_bounds_decoded_lines() {
    // Server declares 2 boxes but the payload decodes 5 data lines; the
    // result is deterministically truncated to the declared count.
    let mut payload = Vec::new();
    payload.extend_from_slice(b",image,class_label,id,x_top_left,y_top_left,width,height,confidence\n");
    for i in 0..5 {
        payload.extend_from_slice(
            format!("{i},img,SUV,{}.0,1.0,1.0,2.0,2.0,0.8\n", i + 1).as_bytes(),
        );
    }
    let transport = ScriptedTransport::new(script(2, &payload));
    let mut client = RemoteInferenceClient::new(transport);

    let pixels = vec![0u8; DIMS.byte_len()];
    let detections = client.classify_frame("f", DIMS, &pixels).unwrap();
    assert_eq!(detections.len(), 2);
    assert_eq!(detections[0].class_id, 1);
    assert_eq!(detections[1].class_id, 2);
}

#[test]
fn fewer_decoded_lines_than_declared_still_returns_them() {
    let payload = b"header\n0,img,T72,4.0,0.0,0.0,5.0,5.0,0.7\n";
    let transport = ScriptedTransport::new(script(3, payload));
    let mut client = RemoteInferenceClient::new(transport);

    let pixels = vec![0u8; DIMS.byte_len()];
    let detections = client.classify_frame("f", DIMS, &pixels).unwrap();
    assert_eq!(detections.len(), 1);
}

#[test]
fn missing_ack_is_a_protocol_failure() {
    // Server closes without sending the first ack byte.
    let transport = ScriptedTransport::new(Vec::new());
    let mut client = RemoteInferenceClient::new(transport);

    let pixels = vec![0u8; DIMS.byte_len()];
    let err = client.classify_frame("f", DIMS, &pixels).unwrap_err();
    assert!(matches!(err, ProtocolError::ShortRead { .. }));
}

#[test]
fn truncated_count_field_is_a_protocol_failure() {
    let mut responses = Vec::new();
    responses.extend_from_slice(b"12"); // both acks
    responses.extend_from_slice(b"3     "); // only 6 of 10 count bytes
    let transport = ScriptedTransport::new(responses);
    let mut client = RemoteInferenceClient::new(transport);

    let pixels = vec![0u8; DIMS.byte_len()];
    let err = client.classify_frame("f", DIMS, &pixels).unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::ShortRead {
            expected: 10,
            got: 6,
            ..
        }
    ));
}

#[test]
fn loopback_server_round_trip() {
    // A thread standing in for the inference server, speaking the protocol
    // the way the deployed Python server does: recv name → send "1",
    // recv dims → send "2", recv pixels, send two 10-byte fields + CSV.
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = std::thread::spawn(move || {
        let (mut conn, _) = listener.accept().unwrap();
        let mut scratch = [0u8; 1024];

        let n = conn.read(&mut scratch).unwrap();
        assert_eq!(&scratch[..n], b"cam_1_frame_00001");
        conn.write_all(b"1").unwrap();

        let n = conn.read(&mut scratch).unwrap();
        assert_eq!(&scratch[..n], b"2,4,3");
        conn.write_all(b"2").unwrap();

        let mut pixels = vec![0u8; DIMS.byte_len()];
        conn.read_exact(&mut pixels).unwrap();

        let payload = b"header\n0,img,BTR70,11.0,5.0,6.0,7.0,8.0,0.88\n";
        conn.write_all(&field10(1)).unwrap();
        conn.write_all(&field10(payload.len())).unwrap();
        conn.write_all(payload).unwrap();
    });

    let mut backend = RemoteBackend::connect(&addr.to_string()).unwrap();
    let frame = Frame::new(1, 1, DIMS, vec![0u8; DIMS.byte_len()]);
    let batch = backend.classify(&frame).unwrap();

    assert_eq!(batch.source_id, 1);
    assert_eq!(batch.detections.len(), 1);
    assert_eq!(batch.detections[0].class_label, "BTR70");
    assert_eq!(batch.detections[0].class_id, 11);
    server.join().unwrap();
}

#[test]
fn payload_ending_early_is_a_protocol_failure() {
    let mut responses = Vec::new();
    responses.extend_from_slice(b"12");
    responses.extend_from_slice(&field10(1));
    responses.extend_from_slice(&field10(100)); // declares 100 payload bytes
    responses.extend_from_slice(b"short"); // delivers 5
    let transport = ScriptedTransport::new(responses);
    let mut client = RemoteInferenceClient::new(transport);

    let pixels = vec![0u8; DIMS.byte_len()];
    let err = client.classify_frame("f", DIMS, &pixels).unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::UnexpectedEof {
            expected: 100,
            got: 5,
            ..
        }
    ));
}
