//! Command dispatch for the simulated module.

use std::collections::HashMap;

use tracing::{debug, warn};

use tpm_protocol::commands::{
    ContextLoad, ContextLoadResponse, ContextSave, ContextSaveResponse, Create, CreatePrimary,
    CreatePrimaryResponse, CreateResponse, EncryptDecrypt, EncryptDecrypt2,
    EncryptDecryptResponse, FlushContext, FlushContextResponse, GetCapability,
    GetCapabilityResponse, GetRandom, GetRandomResponse, Hash, HashResponse, HashSequenceStart,
    HashSequenceStartResponse, Load, LoadResponse, SequenceComplete, SequenceCompleteResponse,
    SequenceUpdate, SequenceUpdateResponse, Sign, SignResponse, VerifySignature,
    VerifySignatureResponse,
};
use tpm_protocol::marshal::put_sized;
use tpm_protocol::types::capability::{MAX_CAP_ALGS, MAX_CAP_CC, MAX_CAP_HANDLES, MAX_TPM_PROPERTIES};
use tpm_protocol::types::{
    AlgorithmProperties, AlgorithmProperty, AuthHandle, Capability, CapabilityData, Context,
    CreationData, EccScheme, PublicDetails, SigScheme, Signature, SymDefObject, TaggedProperty,
    Ticket, TicketKind,
};
use tpm_protocol::{
    AlgorithmId, Command, CommandCode, ContextData, Digest, EccParameter, FrameCodec,
    Handle, Header, Hierarchy, Iv, Marshal, MaxBuffer, Name, Private, ProtocolError, Reader,
    Response, ResponseCode, UnionKind,
};

use crate::crypto::{self, CryptoError};
use crate::keys;
use crate::objects::{Entry, KeyObject, ObjectTable, SequenceObject};

/// Transient object slots, matching a small discrete module.
pub const DEFAULT_MAX_OBJECTS: usize = 3;

/// Saved contexts kept before `ContextSave` answers `TPM_RC_MEMORY`.
pub const DEFAULT_MAX_SAVED_CONTEXTS: usize = 64;

/// Largest `GetRandom` answer.
const MAX_RANDOM: usize = 64;

type CommandResult<R> = Result<R, ResponseCode>;

/// Simulator configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatorConfig {
    /// Size of the transient object table.
    pub max_objects: usize,
    /// Outstanding saved contexts.
    pub max_saved_contexts: usize,
    /// Commands answered with `TPM_RC_COMMAND_CODE` as if unimplemented.
    pub disabled_commands: Vec<CommandCode>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            max_objects: DEFAULT_MAX_OBJECTS,
            max_saved_contexts: DEFAULT_MAX_SAVED_CONTEXTS,
            disabled_commands: Vec::new(),
        }
    }
}

impl SimulatorConfig {
    pub fn with_max_objects(mut self, max_objects: usize) -> Self {
        self.max_objects = max_objects;
        self
    }

    pub fn disable(mut self, code: CommandCode) -> Self {
        self.disabled_commands.push(code);
        self
    }
}

/// Parameter positions for the two `EncryptDecrypt` layouts.
#[derive(Debug, Clone, Copy)]
struct CipherParams {
    mode: u8,
    iv: u8,
    data: u8,
}

const LEGACY_CIPHER_PARAMS: CipherParams = CipherParams {
    mode: 2,
    iv: 3,
    data: 4,
};

const DATA_FIRST_CIPHER_PARAMS: CipherParams = CipherParams {
    data: 1,
    mode: 3,
    iv: 4,
};

/// A software security module.
///
/// Every instance draws its own proof value and hierarchy seeds, so
/// context blobs and wrapped keys from one instance are rejected by any
/// other.
#[derive(Debug)]
pub struct Simulator {
    config: SimulatorConfig,
    codec: FrameCodec,
    proof: Vec<u8>,
    seeds: [Vec<u8>; 4],
    objects: ObjectTable,
    saved: HashMap<u64, Entry>,
    next_sequence: u64,
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new(SimulatorConfig::default())
    }
}

impl Simulator {
    pub fn new(config: SimulatorConfig) -> Self {
        let objects = ObjectTable::new(config.max_objects);
        Self {
            config,
            codec: FrameCodec::new(),
            proof: crypto::random_bytes(32),
            seeds: [
                crypto::random_bytes(32),
                crypto::random_bytes(32),
                crypto::random_bytes(32),
                crypto::random_bytes(32),
            ],
            objects,
            saved: HashMap::new(),
            next_sequence: 1,
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Objects currently occupying a transient slot.
    pub fn loaded_objects(&self) -> usize {
        self.objects.len()
    }

    /// Saved contexts that can still be loaded.
    pub fn saved_contexts(&self) -> usize {
        self.saved.len()
    }

    pub fn max_frame_size(&self) -> usize {
        self.codec.max_frame_size()
    }

    /// Run one complete command buffer and return the response buffer.
    pub fn execute(&mut self, command: &[u8]) -> Vec<u8> {
        let header = match Header::parse(command) {
            Ok(header) => header,
            Err(err) => {
                debug!(error = %err, size = command.len(), "malformed command header");
                return FrameCodec::encode_error(response_code_for(&err));
            }
        };
        let Some(code) = CommandCode::from_u32(header.code) else {
            debug!(code = header.code, "unknown command code");
            return FrameCodec::encode_error(ResponseCode::COMMAND_CODE);
        };
        if self.config.disabled_commands.contains(&code) {
            debug!(command = %code, "command disabled");
            return FrameCodec::encode_error(ResponseCode::COMMAND_CODE);
        }

        match code {
            CommandCode::CreatePrimary => self.run(command, Self::create_primary),
            CommandCode::Create => self.run(command, Self::create),
            CommandCode::Load => self.run(command, Self::load),
            CommandCode::FlushContext => self.run(command, Self::flush_context),
            CommandCode::ContextSave => self.run(command, Self::context_save),
            CommandCode::ContextLoad => self.run(command, Self::context_load),
            CommandCode::Hash => self.run(command, Self::hash),
            CommandCode::HashSequenceStart => self.run(command, Self::hash_sequence_start),
            CommandCode::SequenceUpdate => self.run(command, Self::sequence_update),
            CommandCode::SequenceComplete => self.run(command, Self::sequence_complete),
            CommandCode::EncryptDecrypt => self.run(command, Self::encrypt_decrypt),
            CommandCode::EncryptDecrypt2 => self.run(command, Self::encrypt_decrypt2),
            CommandCode::Sign => self.run(command, Self::sign),
            CommandCode::VerifySignature => self.run(command, Self::verify_signature),
            CommandCode::GetCapability => self.run(command, Self::get_capability),
            CommandCode::GetRandom => self.run(command, Self::get_random),
        }
    }

    fn run<C: Command>(
        &mut self,
        bytes: &[u8],
        handler: fn(&mut Self, C) -> CommandResult<C::Response>,
    ) -> Vec<u8> {
        let decoded = match self.codec.decode_command::<C>(bytes) {
            Ok(decoded) => decoded,
            Err(err) => {
                let code = response_code_for(&err);
                debug!(command = %C::CODE, error = %err, code = %code, "command failed to decode");
                return FrameCodec::encode_error(code);
            }
        };

        match handler(self, decoded.command) {
            Ok(response) => match self.codec.encode_response(&response, decoded.sessions) {
                Ok(bytes) => {
                    debug!(command = %C::CODE, size = bytes.len(), "command completed");
                    bytes
                }
                Err(err) => {
                    warn!(command = %C::CODE, error = %err, "response does not fit in a frame");
                    FrameCodec::encode_error(ResponseCode::FAILURE)
                }
            },
            Err(code) => {
                debug!(command = %C::CODE, code = %code, "command failed");
                FrameCodec::encode_error(code)
            }
        }
    }

    fn seed(&self, hierarchy: Hierarchy) -> &[u8] {
        let index = match hierarchy {
            Hierarchy::Owner => 0,
            Hierarchy::Endorsement => 1,
            Hierarchy::Platform => 2,
            Hierarchy::Null => 3,
        };
        &self.seeds[index]
    }

    fn loaded_key(&self, handle: Handle) -> CommandResult<&KeyObject> {
        match self.objects.get(handle) {
            Some(Entry::Key(key)) => Ok(key),
            Some(Entry::Sequence(_)) => Err(ResponseCode::TYPE.with_handle(1)),
            None => Err(ResponseCode::HANDLE.with_handle(1)),
        }
    }

    fn key(&self, auth: &AuthHandle) -> CommandResult<&KeyObject> {
        let key = self.loaded_key(auth.handle)?;
        authorize(&key.auth, auth)?;
        Ok(key)
    }

    fn storage_parent(&self, auth: &AuthHandle) -> CommandResult<KeyObject> {
        let key = self.key(auth)?;
        if !keys::is_storage_parent(&key.public) {
            return Err(ResponseCode::TYPE.with_handle(1));
        }
        Ok(key.clone())
    }

    fn sequence_mut(&mut self, auth: &AuthHandle) -> CommandResult<&mut SequenceObject> {
        match self.objects.get_mut(auth.handle) {
            Some(Entry::Sequence(seq)) => {
                authorize(&seq.auth, auth)?;
                Ok(seq)
            }
            Some(Entry::Key(_)) => Err(ResponseCode::MODE.with_handle(1)),
            None => Err(ResponseCode::HANDLE.with_handle(1)),
        }
    }

    fn creation_ticket(
        &self,
        name_alg: AlgorithmId,
        hierarchy: Hierarchy,
        name: &Name,
        creation_data: &CreationData,
    ) -> CommandResult<(Digest, Ticket)> {
        let creation_hash =
            crypto::digest(name_alg, &[&creation_data.to_bytes()]).map_err(crypto_code)?;
        let ticket = crypto::digest(name_alg, &[&self.proof, name.as_bytes(), &creation_hash])
            .map_err(crypto_code)?;
        Ok((
            to_digest(creation_hash)?,
            Ticket {
                kind: TicketKind::Creation,
                hierarchy,
                digest: to_digest(ticket)?,
            },
        ))
    }

    fn hashcheck_ticket(
        &self,
        hierarchy: Hierarchy,
        hash_alg: AlgorithmId,
        digest: &[u8],
    ) -> CommandResult<Ticket> {
        if hierarchy == Hierarchy::Null {
            return Ok(Ticket::null_hashcheck());
        }
        let proof = crypto::digest(hash_alg, &[&self.proof, digest]).map_err(crypto_code)?;
        Ok(Ticket {
            kind: TicketKind::HashCheck,
            hierarchy,
            digest: to_digest(proof)?,
        })
    }

    fn create_primary(&mut self, cmd: CreatePrimary) -> CommandResult<CreatePrimaryResponse> {
        let hierarchy = Hierarchy::from_handle(cmd.primary.handle)
            .ok_or(ResponseCode::HIERARCHY.with_handle(1))?;
        authorize(&[], &cmd.primary)?;
        keys::validate(&cmd.public, &cmd.sensitive).map_err(|code| code.with_parameter(2))?;

        // Same seed and template always give the same primary key
        let secret = if cmd.sensitive.data.is_empty() {
            crypto::expand(
                &[self.seed(hierarchy), b"PRIMARY", &cmd.public.to_bytes()],
                keys::secret_len(&cmd.public),
            )
        } else {
            cmd.sensitive.data.as_bytes().to_vec()
        };
        let public =
            keys::complete_public(&cmd.public, &secret).map_err(|code| code.with_parameter(2))?;
        let name = keys::object_name(&public)?;

        let parent_name = hierarchy.handle().permanent_name();
        let creation_data = CreationData {
            pcr_select: cmd.creation_pcr,
            pcr_digest: to_digest(crypto::digest(public.name_alg, &[]).map_err(crypto_code)?)?,
            locality: 0,
            parent_name_alg: AlgorithmId::Null,
            parent_name: parent_name.clone(),
            parent_qualified_name: parent_name,
            outside_info: cmd.outside_info,
        };
        let (creation_hash, creation_ticket) =
            self.creation_ticket(public.name_alg, hierarchy, &name, &creation_data)?;

        let object_handle = self.objects.insert(Entry::Key(KeyObject {
            public: public.clone(),
            name: name.clone(),
            secret,
            auth: cmd.sensitive.user_auth.as_bytes().to_vec(),
            hierarchy,
        }))?;
        debug!(handle = %object_handle, hierarchy = ?hierarchy, "primary object created");

        Ok(CreatePrimaryResponse {
            object_handle,
            out_public: public,
            creation_data,
            creation_hash,
            creation_ticket,
            name,
        })
    }

    fn create(&mut self, cmd: Create) -> CommandResult<CreateResponse> {
        let parent = self.storage_parent(&cmd.parent)?;
        keys::validate(&cmd.public, &cmd.sensitive).map_err(|code| code.with_parameter(2))?;

        let secret = if cmd.sensitive.data.is_empty() {
            crypto::random_bytes(keys::secret_len(&cmd.public))
        } else {
            cmd.sensitive.data.as_bytes().to_vec()
        };
        let public =
            keys::complete_public(&cmd.public, &secret).map_err(|code| code.with_parameter(2))?;
        let name = keys::object_name(&public)?;

        let sensitive = encode_sensitive(cmd.sensitive.user_auth.as_bytes(), &secret);
        let blob = crypto::wrap(&parent.secret, name.as_bytes(), &sensitive).map_err(crypto_code)?;
        let out_private = Private::new(blob).map_err(|_| ResponseCode::SIZE)?;

        let creation_data = CreationData {
            pcr_select: cmd.creation_pcr,
            pcr_digest: to_digest(crypto::digest(public.name_alg, &[]).map_err(crypto_code)?)?,
            locality: 0,
            parent_name_alg: parent.public.name_alg,
            parent_name: parent.name.clone(),
            parent_qualified_name: parent.name.clone(),
            outside_info: cmd.outside_info,
        };
        let (creation_hash, creation_ticket) =
            self.creation_ticket(public.name_alg, parent.hierarchy, &name, &creation_data)?;

        Ok(CreateResponse {
            out_private,
            out_public: public,
            creation_data,
            creation_hash,
            creation_ticket,
        })
    }

    fn load(&mut self, cmd: Load) -> CommandResult<LoadResponse> {
        let parent = self.storage_parent(&cmd.parent)?;
        let public = cmd.in_public;
        let name = keys::object_name(&public).map_err(|code| code.with_parameter(2))?;

        let sensitive = crypto::unwrap(&parent.secret, name.as_bytes(), cmd.in_private.as_bytes())
            .map_err(|_| ResponseCode::INTEGRITY.with_parameter(1))?;
        let (auth, secret) =
            decode_sensitive(&sensitive).ok_or(ResponseCode::INTEGRITY.with_parameter(1))?;

        // The public half must have been derived from this secret
        let expected = keys::complete_public(&public, &secret)?;
        if expected != public {
            return Err(ResponseCode::BINDING);
        }

        let object_handle = self.objects.insert(Entry::Key(KeyObject {
            public,
            name: name.clone(),
            secret,
            auth,
            hierarchy: parent.hierarchy,
        }))?;
        debug!(handle = %object_handle, parent = %cmd.parent.handle, "object loaded");
        Ok(LoadResponse {
            object_handle,
            name,
        })
    }

    fn flush_context(&mut self, cmd: FlushContext) -> CommandResult<FlushContextResponse> {
        self.objects
            .remove(cmd.flush_handle)
            .ok_or(ResponseCode::HANDLE.with_parameter(1))?;
        debug!(handle = %cmd.flush_handle, "context flushed");
        Ok(FlushContextResponse)
    }

    fn context_save(&mut self, cmd: ContextSave) -> CommandResult<ContextSaveResponse> {
        let entry = self
            .objects
            .get(cmd.save_handle)
            .ok_or(ResponseCode::HANDLE.with_handle(1))?
            .clone();
        if self.saved.len() >= self.config.max_saved_contexts {
            return Err(ResponseCode::MEMORY);
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let saved_handle = entry.saved_handle();
        let hierarchy = entry.hierarchy();
        let blob = crypto::context_integrity(
            &self.proof,
            sequence,
            saved_handle.0,
            hierarchy.handle().0,
        );
        self.saved.insert(sequence, entry);

        debug!(handle = %cmd.save_handle, sequence, "context saved");
        Ok(ContextSaveResponse {
            context: Context {
                sequence,
                saved_handle,
                hierarchy,
                blob: ContextData::new(blob).map_err(|_| ResponseCode::SIZE)?,
            },
        })
    }

    fn context_load(&mut self, cmd: ContextLoad) -> CommandResult<ContextLoadResponse> {
        let context = cmd.context;
        let expected = crypto::context_integrity(
            &self.proof,
            context.sequence,
            context.saved_handle.0,
            context.hierarchy.handle().0,
        );
        if expected != context.blob.as_bytes() {
            return Err(ResponseCode::INTEGRITY.with_parameter(1));
        }
        // Each blob loads at most once
        let entry = self
            .saved
            .remove(&context.sequence)
            .ok_or(ResponseCode::INTEGRITY.with_parameter(1))?;

        match self.objects.insert(entry.clone()) {
            Ok(loaded_handle) => {
                debug!(handle = %loaded_handle, sequence = context.sequence, "context loaded");
                Ok(ContextLoadResponse { loaded_handle })
            }
            Err(code) => {
                self.saved.insert(context.sequence, entry);
                Err(code)
            }
        }
    }

    fn hash(&mut self, cmd: Hash) -> CommandResult<HashResponse> {
        let digest = crypto::digest(cmd.hash_alg, &[cmd.data.as_bytes()])
            .map_err(|_| ResponseCode::HASH.with_parameter(2))?;
        let validation = self.hashcheck_ticket(cmd.hierarchy, cmd.hash_alg, &digest)?;
        Ok(HashResponse {
            out_hash: to_digest(digest)?,
            validation,
        })
    }

    fn hash_sequence_start(
        &mut self,
        cmd: HashSequenceStart,
    ) -> CommandResult<HashSequenceStartResponse> {
        let hasher =
            crypto::hasher(cmd.hash_alg).map_err(|_| ResponseCode::HASH.with_parameter(2))?;
        let sequence_handle = self.objects.insert(Entry::Sequence(SequenceObject {
            hash_alg: cmd.hash_alg,
            hasher,
            auth: cmd.auth.as_bytes().to_vec(),
        }))?;
        debug!(handle = %sequence_handle, alg = %cmd.hash_alg, "hash sequence started");
        Ok(HashSequenceStartResponse { sequence_handle })
    }

    fn sequence_update(&mut self, cmd: SequenceUpdate) -> CommandResult<SequenceUpdateResponse> {
        self.sequence_mut(&cmd.sequence)?
            .hasher
            .update(cmd.buffer.as_bytes());
        Ok(SequenceUpdateResponse)
    }

    fn sequence_complete(
        &mut self,
        cmd: SequenceComplete,
    ) -> CommandResult<SequenceCompleteResponse> {
        self.sequence_mut(&cmd.sequence)?;
        let Some(Entry::Sequence(mut seq)) = self.objects.remove(cmd.sequence.handle) else {
            return Err(ResponseCode::HANDLE.with_handle(1));
        };
        seq.hasher.update(cmd.buffer.as_bytes());
        let digest = seq.hasher.finalize();
        let validation = self.hashcheck_ticket(cmd.hierarchy, seq.hash_alg, &digest)?;
        Ok(SequenceCompleteResponse {
            result: to_digest(digest)?,
            validation,
        })
    }

    fn encrypt_decrypt(&mut self, cmd: EncryptDecrypt) -> CommandResult<EncryptDecryptResponse> {
        self.symmetric(cmd, LEGACY_CIPHER_PARAMS)
    }

    fn encrypt_decrypt2(
        &mut self,
        cmd: EncryptDecrypt2,
    ) -> CommandResult<EncryptDecryptResponse> {
        self.symmetric(cmd.into(), DATA_FIRST_CIPHER_PARAMS)
    }

    fn symmetric(
        &self,
        cmd: EncryptDecrypt,
        params: CipherParams,
    ) -> CommandResult<EncryptDecryptResponse> {
        let key = self.key(&cmd.key)?;
        let PublicDetails::SymCipher {
            symmetric:
                SymDefObject::Cipher {
                    algorithm,
                    mode: key_mode,
                    ..
                },
            ..
        } = &key.public.details
        else {
            return Err(ResponseCode::TYPE.with_handle(1));
        };

        let attrs = key.public.attributes;
        let permitted = if cmd.decrypt {
            attrs.decrypt()
        } else {
            attrs.sign()
        };
        if !permitted || attrs.restricted() {
            return Err(ResponseCode::ATTRIBUTES.with_handle(1));
        }

        let mode = match (cmd.mode, *key_mode) {
            (AlgorithmId::Null, AlgorithmId::Null) => {
                return Err(ResponseCode::MODE.with_parameter(params.mode))
            }
            (AlgorithmId::Null, key_mode) => key_mode,
            (requested, AlgorithmId::Null) => requested,
            (requested, key_mode) if requested == key_mode => requested,
            _ => return Err(ResponseCode::MODE.with_parameter(params.mode)),
        };

        let output = crypto::apply_cipher(
            *algorithm,
            mode,
            &key.secret,
            cmd.iv_in.as_bytes(),
            cmd.data.as_bytes(),
            cmd.decrypt,
        )
        .map_err(|err| match err {
            CryptoError::UnsupportedMode(_) => ResponseCode::MODE.with_parameter(params.mode),
            CryptoError::IvLength { .. } => ResponseCode::SIZE.with_parameter(params.iv),
            CryptoError::Unaligned { .. } => ResponseCode::SIZE.with_parameter(params.data),
            _ => ResponseCode::FAILURE,
        })?;

        Ok(EncryptDecryptResponse {
            out_data: MaxBuffer::new(output.data).map_err(|_| ResponseCode::SIZE)?,
            iv_out: Iv::new(output.iv_out).map_err(|_| ResponseCode::SIZE)?,
        })
    }

    fn sign(&mut self, cmd: Sign) -> CommandResult<SignResponse> {
        let key = self.key(&cmd.key)?;
        let PublicDetails::Ecc {
            scheme: key_scheme,
            curve,
            ..
        } = &key.public.details
        else {
            return Err(ResponseCode::KEY.with_handle(1));
        };
        if !key.public.attributes.sign() {
            return Err(ResponseCode::KEY.with_handle(1));
        }

        let (scheme, hash) = match (cmd.scheme, *key_scheme) {
            (SigScheme::Hashed { scheme, hash }, EccScheme::Null) => (scheme, hash),
            (SigScheme::Null, EccScheme::Hashed { scheme, hash }) => (scheme, hash),
            (SigScheme::Hashed { scheme, hash }, EccScheme::Hashed { scheme: s, hash: h })
                if scheme == s && hash == h =>
            {
                (scheme, hash)
            }
            _ => return Err(ResponseCode::SCHEME.with_parameter(2)),
        };
        let scheme_fits = match scheme {
            AlgorithmId::Gost3410_256 | AlgorithmId::Gost3410_512 => {
                curve.gost_signature() == Some(scheme)
            }
            AlgorithmId::EcDsa | AlgorithmId::EcSchnorr => true,
            _ => false,
        };
        if !scheme_fits {
            return Err(ResponseCode::SCHEME.with_parameter(2));
        }
        if hash.digest_size() != Some(cmd.digest.len()) {
            return Err(ResponseCode::SIZE.with_parameter(1));
        }

        if key.public.attributes.restricted() {
            let expected = self.hashcheck_ticket(cmd.validation.hierarchy, hash, cmd.digest.as_bytes())?;
            if cmd.validation.hierarchy == Hierarchy::Null || cmd.validation != expected {
                return Err(ResponseCode::TICKET.with_parameter(3));
            }
        }

        let size = curve.coordinate_size();
        let r = crypto::random_bytes(size);
        let s = crypto::signature_value(hash, &key.secret, &r, cmd.digest.as_bytes(), size)
            .map_err(|_| ResponseCode::HASH.with_parameter(2))?;
        debug!(handle = %cmd.key.handle, scheme = %scheme, "digest signed");

        Ok(SignResponse {
            signature: Signature::Ecc {
                scheme,
                hash,
                r: EccParameter::new(r).map_err(|_| ResponseCode::SIZE)?,
                s: EccParameter::new(s).map_err(|_| ResponseCode::SIZE)?,
            },
        })
    }

    fn verify_signature(
        &mut self,
        cmd: VerifySignature,
    ) -> CommandResult<VerifySignatureResponse> {
        let key = self.loaded_key(cmd.key)?;
        let PublicDetails::Ecc {
            scheme: key_scheme,
            curve,
            ..
        } = &key.public.details
        else {
            return Err(ResponseCode::KEY.with_handle(1));
        };
        if !key.public.attributes.sign() {
            return Err(ResponseCode::KEY.with_handle(1));
        }

        let Signature::Ecc {
            scheme,
            hash,
            r,
            s,
        } = &cmd.signature
        else {
            return Err(ResponseCode::SCHEME.with_parameter(2));
        };
        if let EccScheme::Hashed {
            scheme: key_scheme,
            hash: key_hash,
        } = *key_scheme
        {
            if key_scheme != *scheme || key_hash != *hash {
                return Err(ResponseCode::SCHEME.with_parameter(2));
            }
        }

        let size = curve.coordinate_size();
        if r.len() != size || s.len() != size {
            return Err(ResponseCode::SIGNATURE.with_parameter(2));
        }
        let expected =
            crypto::signature_value(*hash, &key.secret, r.as_bytes(), cmd.digest.as_bytes(), size)
                .map_err(|_| ResponseCode::HASH.with_parameter(2))?;
        if expected != s.as_bytes() {
            return Err(ResponseCode::SIGNATURE.with_parameter(2));
        }

        let proof = crypto::digest(
            key.public.name_alg,
            &[&self.proof, key.name.as_bytes(), cmd.digest.as_bytes()],
        )
        .map_err(crypto_code)?;
        Ok(VerifySignatureResponse {
            validation: Ticket {
                kind: TicketKind::Verified,
                hierarchy: key.hierarchy,
                digest: to_digest(proof)?,
            },
        })
    }

    fn get_capability(&mut self, cmd: GetCapability) -> CommandResult<GetCapabilityResponse> {
        let start = cmd.property;
        let (more_data, data) = match cmd.capability {
            Capability::Algorithms => {
                let (items, more) = page(
                    supported_algorithms()
                        .into_iter()
                        .filter(|alg| u32::from(alg.id) >= start),
                    cmd.count,
                    MAX_CAP_ALGS,
                );
                (more, CapabilityData::Algorithms(items))
            }
            Capability::Handles => {
                let transient = start >> 24 == u32::from(Handle::TRANSIENT_FIRST.kind());
                let handles: Vec<Handle> = if transient {
                    self.objects.handles().filter(|h| h.0 >= start).collect()
                } else {
                    Vec::new()
                };
                let (items, more) = page(handles.into_iter(), cmd.count, MAX_CAP_HANDLES);
                (more, CapabilityData::Handles(items))
            }
            Capability::Commands => {
                let (items, more) = page(
                    CommandCode::ALL
                        .iter()
                        .copied()
                        .filter(|code| code.as_u32() >= start)
                        .filter(|code| !self.config.disabled_commands.contains(code))
                        .map(command_attributes),
                    cmd.count,
                    MAX_CAP_CC,
                );
                (more, CapabilityData::Commands(items))
            }
            Capability::TpmProperties => {
                let frame = self.codec.max_frame_size() as u32;
                let properties = [
                    (TaggedProperty::INPUT_BUFFER, MaxBuffer::MAX_SIZE as u32),
                    (TaggedProperty::HR_TRANSIENT_MIN, self.objects.capacity() as u32),
                    (TaggedProperty::MAX_COMMAND_SIZE, frame),
                    (TaggedProperty::MAX_RESPONSE_SIZE, frame),
                    (TaggedProperty::MAX_DIGEST, 64),
                    (TaggedProperty::HR_TRANSIENT_AVAIL, self.objects.available() as u32),
                ];
                let (items, more) = page(
                    properties
                        .into_iter()
                        .filter(|(property, _)| *property >= start)
                        .map(|(property, value)| TaggedProperty { property, value }),
                    cmd.count,
                    MAX_TPM_PROPERTIES,
                );
                (more, CapabilityData::TpmProperties(items))
            }
        };
        Ok(GetCapabilityResponse { more_data, data })
    }

    fn get_random(&mut self, cmd: GetRandom) -> CommandResult<GetRandomResponse> {
        let len = usize::from(cmd.bytes_requested).min(MAX_RANDOM);
        Ok(GetRandomResponse {
            random_bytes: to_digest(crypto::random_bytes(len))?,
        })
    }
}

fn authorize(expected: &[u8], auth: &AuthHandle) -> CommandResult<()> {
    if auth.auth.value() != expected {
        return Err(ResponseCode::AUTH_FAIL.with_session(1));
    }
    Ok(())
}

fn to_digest(bytes: Vec<u8>) -> CommandResult<Digest> {
    Digest::new(bytes).map_err(|_| ResponseCode::SIZE)
}

fn crypto_code(err: CryptoError) -> ResponseCode {
    match err {
        CryptoError::UnsupportedHash(_) => ResponseCode::HASH,
        _ => ResponseCode::FAILURE,
    }
}

fn encode_sensitive(auth: &[u8], secret: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + auth.len() + secret.len());
    put_sized(&mut buf, auth);
    put_sized(&mut buf, secret);
    buf
}

fn decode_sensitive(bytes: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
    let mut reader = Reader::new(bytes);
    let auth = reader.sized().ok()?.to_vec();
    let secret = reader.sized().ok()?.to_vec();
    reader.is_empty().then_some((auth, secret))
}

fn page<T>(items: impl Iterator<Item = T>, count: u32, max: usize) -> (Vec<T>, bool) {
    let limit = (count as usize).min(max);
    let mut items = items.peekable();
    let page: Vec<T> = items.by_ref().take(limit).collect();
    let more = items.peek().is_some();
    (page, more)
}

fn supported_algorithms() -> Vec<AlgorithmProperty> {
    use AlgorithmProperties as P;
    let mut algorithms: Vec<AlgorithmProperty> = [
        (AlgorithmId::Rsa, P::ASYMMETRIC | P::OBJECT),
        (AlgorithmId::Aes, P::SYMMETRIC),
        (AlgorithmId::KeyedHash, P::HASH | P::OBJECT),
        (AlgorithmId::Sha256, P::HASH),
        (AlgorithmId::Sha384, P::HASH),
        (AlgorithmId::Sha512, P::HASH),
        (AlgorithmId::EcDsa, P::ASYMMETRIC | P::SIGNING),
        (AlgorithmId::Ecc, P::ASYMMETRIC | P::OBJECT),
        (AlgorithmId::SymCipher, P::OBJECT),
        (AlgorithmId::Ctr, P::SYMMETRIC | P::ENCRYPTING),
        (AlgorithmId::Cbc, P::SYMMETRIC | P::ENCRYPTING),
        (AlgorithmId::Gost3411_256, P::HASH),
        (AlgorithmId::Gost3411_512, P::HASH),
        (AlgorithmId::Magma, P::SYMMETRIC),
        (AlgorithmId::Grasshopper, P::SYMMETRIC),
        (AlgorithmId::Gost3410_256, P::ASYMMETRIC | P::SIGNING),
        (AlgorithmId::Gost3410_512, P::ASYMMETRIC | P::SIGNING),
    ]
    .into_iter()
    .map(|(alg, bits)| AlgorithmProperty {
        id: alg.as_u16(),
        properties: AlgorithmProperties(bits),
    })
    .collect();
    algorithms.sort_by_key(|alg| alg.id);
    algorithms
}

fn cc_bits<C: Command>() -> u32 {
    let mut bits = C::CODE.as_u32() & 0xFFFF;
    bits |= (C::HANDLES as u32 & 0x7) << 25;
    if <C::Response as Response>::HANDLES > 0 {
        bits |= 1 << 28;
    }
    bits
}

/// `TPMA_CC` for a supported command.
fn command_attributes(code: CommandCode) -> u32 {
    match code {
        CommandCode::CreatePrimary => cc_bits::<CreatePrimary>(),
        CommandCode::SequenceComplete => cc_bits::<SequenceComplete>(),
        CommandCode::Create => cc_bits::<Create>(),
        CommandCode::Load => cc_bits::<Load>(),
        CommandCode::SequenceUpdate => cc_bits::<SequenceUpdate>(),
        CommandCode::Sign => cc_bits::<Sign>(),
        CommandCode::ContextLoad => cc_bits::<ContextLoad>(),
        CommandCode::ContextSave => cc_bits::<ContextSave>(),
        CommandCode::EncryptDecrypt => cc_bits::<EncryptDecrypt>(),
        CommandCode::FlushContext => cc_bits::<FlushContext>(),
        CommandCode::VerifySignature => cc_bits::<VerifySignature>(),
        CommandCode::GetCapability => cc_bits::<GetCapability>(),
        CommandCode::GetRandom => cc_bits::<GetRandom>(),
        CommandCode::Hash => cc_bits::<Hash>(),
        CommandCode::HashSequenceStart => cc_bits::<HashSequenceStart>(),
        CommandCode::EncryptDecrypt2 => cc_bits::<EncryptDecrypt2>(),
    }
}

/// The code a module answers with when a command fails to unmarshal.
pub(crate) fn response_code_for(err: &ProtocolError) -> ResponseCode {
    match err {
        ProtocolError::TruncatedInput { .. } | ProtocolError::MalformedLength { .. } => {
            ResponseCode::INSUFFICIENT
        }
        ProtocolError::UnknownAlgorithmTag { context, .. } => match context {
            UnionKind::Hash => ResponseCode::HASH,
            UnionKind::SymmetricObject => ResponseCode::SYMMETRIC,
            UnionKind::CipherMode => ResponseCode::MODE,
            UnionKind::ObjectType => ResponseCode::TYPE,
            UnionKind::KdfScheme => ResponseCode::KDF,
            UnionKind::KeyedHashScheme
            | UnionKind::RsaScheme
            | UnionKind::EccScheme
            | UnionKind::SignatureScheme
            | UnionKind::Signature => ResponseCode::SCHEME,
            UnionKind::Algorithm => ResponseCode::VALUE,
        },
        ProtocolError::InvalidValue { .. } | ProtocolError::ListTooLong { .. } => {
            ResponseCode::VALUE
        }
        ProtocolError::TrailingBytes { .. } | ProtocolError::BufferTooLarge { .. } => {
            ResponseCode::SIZE
        }
        ProtocolError::SizeMismatch { .. } | ProtocolError::FrameTooLarge { .. } => {
            ResponseCode::COMMAND_SIZE
        }
        ProtocolError::InvalidTag(_) => ResponseCode::BAD_TAG,
        ProtocolError::UnsupportedCommand(_) => ResponseCode::COMMAND_CODE,
        ProtocolError::AuthorizationMissing { .. } => ResponseCode::AUTH_MISSING,
    }
}
