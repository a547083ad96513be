use crate::models::{
    AudioInfoMessage, ContentListMessage, ContentRequestMessage, SettingsMessage, StatusMessage,
};

/// Client ack, no body. Interpreted by the server as an RTT probe reply.
pub const TAG_ACK: u8 = 0x01;
/// Server-to-client audio packet.
pub const TAG_AUDIO: u8 = 0xFA;
/// Server-to-client windows/displays response.
pub const TAG_CONTENT_LIST: u8 = 0xFD;
/// Client-to-server windows/displays request.
pub const TAG_CONTENT_REQUEST: u8 = 0xFE;
/// Client-to-server settings update.
pub const TAG_SETTINGS: u8 = 0xFF;

/// Video frames carry no tag byte. Frames below this length are padded
/// so a frame's leading `u32` length never collides with a tag byte in
/// the same direction.
pub const MIN_IMAGE_LEN: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Untagged video frame: status envelope plus compressed image bytes.
    Frame {
        status: StatusMessage,
        image: Vec<u8>,
    },
    /// `0xFA`: audio info envelope plus int16 interleaved samples.
    Audio {
        info: AudioInfoMessage,
        samples: Vec<u8>,
    },
    /// `0xFD`: windows/displays response.
    ContentList(ContentListMessage),
    /// `0xFE`: windows/displays request.
    ContentRequest(ContentRequestMessage),
    /// `0xFF`: settings update.
    Settings(SettingsMessage),
    /// `0x01`: bare ack byte.
    Ack,
}

impl Packet {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Packet::Frame { status, image } => {
                let status = serde_json::to_vec(status).unwrap();
                assert!(status.len() <= u8::MAX as usize);
                let image_len = image.len().max(MIN_IMAGE_LEN);
                let mut buf = Vec::with_capacity(4 + 1 + status.len() + image_len);
                buf.extend_from_slice(&(image_len as u32).to_be_bytes());
                buf.push(status.len() as u8);
                buf.extend_from_slice(&status);
                buf.extend_from_slice(image);
                // Pad short images up to the framing minimum. JPEG decoders
                // stop at the EOI marker, so trailing zeros are harmless.
                buf.resize(4 + 1 + status.len() + image_len, 0);
                buf
            }
            Packet::Audio { info, samples } => {
                let info = serde_json::to_vec(info).unwrap();
                assert!(info.len() <= u16::MAX as usize);
                let mut buf = Vec::with_capacity(1 + 2 + 4 + info.len() + samples.len());
                buf.push(TAG_AUDIO);
                buf.extend_from_slice(&(info.len() as u16).to_be_bytes());
                buf.extend_from_slice(&(samples.len() as u32).to_be_bytes());
                buf.extend_from_slice(&info);
                buf.extend_from_slice(samples);
                buf
            }
            Packet::ContentList(list) => encode_tagged_json(TAG_CONTENT_LIST, list),
            Packet::ContentRequest(req) => encode_tagged_json(TAG_CONTENT_REQUEST, req),
            Packet::Settings(settings) => encode_tagged_json(TAG_SETTINGS, settings),
            Packet::Ack => vec![TAG_ACK],
        }
    }
}

fn encode_tagged_json<T: serde::Serialize>(tag: u8, body: &T) -> Vec<u8> {
    let body = serde_json::to_vec(body).unwrap();
    let mut buf = Vec::with_capacity(1 + 4 + body.len());
    buf.push(tag);
    buf.extend_from_slice(&(body.len() as u32).to_be_bytes());
    buf.extend_from_slice(&body);
    buf
}

impl From<SettingsMessage> for Packet {
    fn from(value: SettingsMessage) -> Self {
        Packet::Settings(value)
    }
}

impl From<ContentListMessage> for Packet {
    fn from(value: ContentListMessage) -> Self {
        Packet::ContentList(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_is_single_byte() {
        assert_eq!(Packet::Ack.encode(), vec![TAG_ACK]);
    }

    #[test]
    fn test_frame_layout() {
        let status = StatusMessage {
            fps: 30,
            quality: 50,
            latency: 0,
            audio_enabled: false,
            audio_latency: 0,
        };
        let image = vec![0xAB; 600];
        let bytes = Packet::Frame {
            status: status.clone(),
            image: image.clone(),
        }
        .encode();

        let image_len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        assert_eq!(image_len, 600);
        let status_len = bytes[4] as usize;
        let parsed: StatusMessage = serde_json::from_slice(&bytes[5..5 + status_len]).unwrap();
        assert_eq!(parsed, status);
        assert_eq!(&bytes[5 + status_len..], &image[..]);
    }

    #[test]
    fn test_short_frame_is_padded() {
        let status = StatusMessage {
            fps: 30,
            quality: 50,
            latency: 0,
            audio_enabled: false,
            audio_latency: 0,
        };
        let bytes = Packet::Frame {
            status,
            image: vec![0xFF; 10],
        }
        .encode();
        let image_len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        assert_eq!(image_len, MIN_IMAGE_LEN);
        // The leading length byte can never look like a tag.
        assert_eq!(bytes[0], 0x00);
    }

    #[test]
    fn test_audio_layout() {
        let info = AudioInfoMessage::new(44100.0, 2, 4, 0.5, 1.0);
        let samples = vec![1u8, 2, 3, 4, 5, 6, 7, 8];
        let bytes = Packet::Audio {
            info: info.clone(),
            samples: samples.clone(),
        }
        .encode();

        assert_eq!(bytes[0], TAG_AUDIO);
        let info_len = u16::from_be_bytes([bytes[1], bytes[2]]) as usize;
        let audio_len = u32::from_be_bytes([bytes[3], bytes[4], bytes[5], bytes[6]]) as usize;
        assert_eq!(audio_len, samples.len());
        let parsed: AudioInfoMessage = serde_json::from_slice(&bytes[7..7 + info_len]).unwrap();
        assert_eq!(parsed, info);
        assert_eq!(&bytes[7 + info_len..], &samples[..]);
    }
}
